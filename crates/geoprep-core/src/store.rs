//! Record Storage: key-value backends for per-image records
//!
//! Keys are `(image, slot)`; a slot is a stage id or a flag name. Values are
//! opaque bytes, the tracker owns the encoding. A `put` replaces the previous
//! value in one step: readers observe the old or the new bytes, never a mix.
use crate::error::StoreError;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait RecordStore: Send + Sync {
    fn get(&self, image: &str, slot: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, image: &str, slot: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether something was removed.
    fn delete(&self, image: &str, slot: &str) -> Result<bool, StoreError>;

    fn contains(&self, image: &str, slot: &str) -> Result<bool, StoreError> {
        Ok(self.get(image, slot)?.is_some())
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Poisoned("memory store lock".to_string())
}

impl RecordStore for MemoryStore {
    fn get(&self, image: &str, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .get(&(image.to_string(), slot.to_string()))
            .cloned())
    }

    fn put(&self, image: &str, slot: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert((image.to_string(), slot.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, image: &str, slot: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries
            .remove(&(image.to_string(), slot.to_string()))
            .is_some())
    }
}

/// Filesystem store: `<root>/<blake3(image)>/<slot>.json`.
///
/// Writes land in a sibling temp file first and are moved into place with
/// `rename`, which is atomic on the same filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every record of `image`.
    pub fn image_dir(&self, image: &str) -> PathBuf {
        self.root
            .join(blake3::hash(image.as_bytes()).to_hex().as_str())
    }

    fn slot_path(&self, image: &str, slot: &str) -> PathBuf {
        self.image_dir(image).join(format!("{}.json", slot))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl RecordStore for FsStore {
    fn get(&self, image: &str, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.slot_path(image, slot);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn put(&self, image: &str, slot: &str, value: &[u8]) -> Result<(), StoreError> {
        let dir = self.image_dir(image);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let path = self.slot_path(image, slot);
        let tmp = dir.join(format!("{}.json.tmp", slot));
        fs::write(&tmp, value).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))
    }

    fn delete(&self, image: &str, slot: &str) -> Result<bool, StoreError> {
        let path = self.slot_path(image, slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("geoprep-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("a.jpg", "geotag_process").unwrap().is_none());

        store.put("a.jpg", "geotag_process", b"{}").unwrap();
        assert_eq!(store.get("a.jpg", "geotag_process").unwrap(), Some(b"{}".to_vec()));
        assert!(!store.contains("b.jpg", "geotag_process").unwrap());

        assert!(store.delete("a.jpg", "geotag_process").unwrap());
        assert!(!store.delete("a.jpg", "geotag_process").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_fs_store_replaces_value() {
        let root = temp_root();
        let store = FsStore::new(&root);

        store.put("dir/a.jpg", "duplicate", b"first").unwrap();
        store.put("dir/a.jpg", "duplicate", b"second").unwrap();
        assert_eq!(store.get("dir/a.jpg", "duplicate").unwrap(), Some(b"second".to_vec()));

        // No temp file is left behind after a write
        let leftovers: Vec<_> = fs::read_dir(store.image_dir("dir/a.jpg"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());

        assert!(store.delete("dir/a.jpg", "duplicate").unwrap());
        assert!(store.get("dir/a.jpg", "duplicate").unwrap().is_none());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_fs_store_images_are_isolated() {
        let root = temp_root();
        let store = FsStore::new(&root);

        store.put("a.jpg", "upload_success", b"x").unwrap();
        assert!(store.contains("a.jpg", "upload_success").unwrap());
        assert!(!store.contains("b.jpg", "upload_success").unwrap());
        assert_ne!(store.image_dir("a.jpg"), store.image_dir("b.jpg"));

        fs::remove_dir_all(&root).ok();
    }
}
