//! Stage Tracker: idempotent per-image, per-stage outcome ledger
//!
//! Every stage attempt ends in exactly one [`StageRecord`] for its
//! `(image, stage)` slot. The record is written as a whole, so a failure
//! supersedes an earlier success together with its payload, and a success
//! supersedes an earlier failure. [`StageTracker::should_run`] is the gate
//! that makes re-running a batch skip finished work.
use crate::error::StoreError;
use crate::listener::{NoopListener, StageEvent, StageListener};
use crate::record::{Flag, FlagRecord, StagePayload, StageRecord};
use crate::stage::{Stage, StageStatus};
use crate::store::{MemoryStore, RecordStore};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct StageTracker {
    store: Arc<dyn RecordStore>,
    listener: Arc<dyn StageListener>,
}

impl std::fmt::Debug for StageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StageTracker").finish_non_exhaustive()
    }
}

impl StageTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            listener: Arc::new(NoopListener),
        }
    }

    /// Tracker over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_listener(mut self, listener: Arc<dyn StageListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Record the outcome of a stage attempt.
    ///
    /// A success without payload is downgraded to a failure. Returns the
    /// status that was actually persisted.
    pub fn record_result(
        &self,
        image: &str,
        stage: Stage,
        status: StageStatus,
        payload: Option<StagePayload>,
    ) -> Result<StageStatus, StoreError> {
        let record = match (status, payload) {
            (StageStatus::Success, Some(payload)) => StageRecord::success(image, stage, payload),
            (StageStatus::Success, None) => {
                tracing::warn!(%image, %stage, "success reported without data, recording as failed");
                StageRecord::failed(image, stage)
            }
            (StageStatus::Failed, _) => StageRecord::failed(image, stage),
        };

        if record.status == StageStatus::Failed {
            match self.read_record(image, stage) {
                Ok(Some(previous)) if previous.payload.is_some() => tracing::warn!(
                    %image,
                    %stage,
                    "stage failed in this run, previously generated properties are removed"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    %image,
                    %stage,
                    error = %e,
                    "previous record is unreadable and gets replaced"
                ),
            }
        }

        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store.put(image, stage.id(), &bytes)?;

        // A new position invalidates any earlier duplicate verdict
        if stage == Stage::GeotagProcess && record.status == StageStatus::Success {
            if let Err(e) = self.clear_duplicate(image) {
                tracing::warn!(%image, error = %e, "could not clear the duplicate flag");
            }
        }

        self.listener.notify(&StageEvent {
            image: record.image.clone(),
            stage,
            status: record.status,
            payload: record.payload.clone(),
        });

        Ok(record.status)
    }

    pub fn record_success(
        &self,
        image: &str,
        stage: Stage,
        payload: impl Into<StagePayload>,
    ) -> Result<StageStatus, StoreError> {
        self.record_result(image, stage, StageStatus::Success, Some(payload.into()))
    }

    pub fn record_failure(&self, image: &str, stage: Stage) -> Result<StageStatus, StoreError> {
        self.record_result(image, stage, StageStatus::Failed, None)
    }

    /// Record `stage` as failed for every image in `images`.
    ///
    /// Storage errors are logged per image and do not stop the loop.
    pub fn fail_all<I, S>(&self, images: I, stage: Stage) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut recorded = 0;
        for image in images {
            let image = image.as_ref();
            match self.record_failure(image, stage) {
                Ok(_) => recorded += 1,
                Err(e) => tracing::error!(%image, %stage, error = %e, "could not record failure"),
            }
        }
        recorded
    }

    /// Full record of the last attempt, if any.
    pub fn read_record(&self, image: &str, stage: Stage) -> Result<Option<StageRecord>, StoreError> {
        match self.store.get(image, stage.id())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Payload of the last attempt if it succeeded.
    pub fn read_result(&self, image: &str, stage: Stage) -> Result<Option<StagePayload>, StoreError> {
        Ok(self
            .read_record(image, stage)?
            .filter(|r| r.status.is_success())
            .and_then(|r| r.payload))
    }

    pub fn status(&self, image: &str, stage: Stage) -> Result<Option<StageStatus>, StoreError> {
        Ok(self.read_record(image, stage)?.map(|r| r.status))
    }

    /// Whether `stage` has to run for `image`.
    ///
    /// Uploaded images never run again. Otherwise a stage runs when it has
    /// not succeeded yet, or when `rerun` forces it. A record that cannot be
    /// read counts as not succeeded, so the next attempt overwrites it.
    pub fn should_run(&self, image: &str, stage: Stage, rerun: bool) -> Result<bool, StoreError> {
        if self.is_uploaded(image)? {
            return Ok(false);
        }
        if rerun {
            return Ok(true);
        }
        match self.status(image, stage) {
            Ok(status) => Ok(status != Some(StageStatus::Success)),
            Err(e) => {
                tracing::warn!(%image, %stage, error = %e, "stage record unreadable, running again");
                Ok(true)
            }
        }
    }

    pub fn mark_duplicate(&self, image: &str) -> Result<(), StoreError> {
        self.set_flag(image, Flag::Duplicate)
    }

    /// Returns whether a flag was present.
    pub fn clear_duplicate(&self, image: &str) -> Result<bool, StoreError> {
        self.store.delete(image, Flag::Duplicate.slot())
    }

    pub fn is_duplicate(&self, image: &str) -> Result<bool, StoreError> {
        self.store.contains(image, Flag::Duplicate.slot())
    }

    /// Terminal flag, set by the uploader once the image is on the server.
    pub fn mark_uploaded(&self, image: &str) -> Result<(), StoreError> {
        self.set_flag(image, Flag::UploadSuccess)
    }

    pub fn is_uploaded(&self, image: &str) -> Result<bool, StoreError> {
        self.store.contains(image, Flag::UploadSuccess.slot())
    }

    fn set_flag(&self, image: &str, flag: Flag) -> Result<(), StoreError> {
        let record = FlagRecord {
            image: image.to_string(),
            flag,
            timestamp: Utc::now(),
        };
        self.store.put(image, flag.slot(), &serde_json::to_vec(&record)?)
    }

    // ------------------------------------------------------------------
    // Batch queries
    // ------------------------------------------------------------------

    /// Images for which `stage` should run, sorted.
    pub fn pending<I, S>(&self, images: I, stage: Stage, rerun: bool) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_sorted(images, |image| self.should_run(image, stage, rerun))
    }

    /// Images whose last `stage` attempt ended with `status`, sorted.
    pub fn with_status<I, S>(
        &self,
        images: I,
        stage: Stage,
        status: StageStatus,
    ) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_sorted(images, |image| Ok(self.status(image, stage)? == Some(status)))
    }

    /// Images carrying the duplicate flag, sorted.
    pub fn duplicates<I, S>(&self, images: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_sorted(images, |image| self.is_duplicate(image))
    }

    fn filter_sorted<I, S, F>(&self, images: I, mut keep: F) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str) -> Result<bool, StoreError>,
    {
        let mut selected = Vec::new();
        for image in images {
            let image = image.as_ref();
            if keep(image)? {
                selected.push(image.to_string());
            }
        }
        selected.sort();
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CompassHeading, GeotagPayload};
    use crate::store::FsStore;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<StageEvent>>,
    }

    impl StageListener for RecordingListener {
        fn notify(&self, event: &StageEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn geotag() -> GeotagPayload {
        GeotagPayload {
            latitude: 59.33,
            longitude: 18.06,
            capture_time: NaiveDate::from_ymd_opt(2021, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            altitude: Some(21.0),
            compass_heading: Some(CompassHeading::uniform(90.0)),
        }
    }

    #[test]
    fn test_success_then_read() {
        let tracker = StageTracker::in_memory();
        let status = tracker
            .record_success("a.jpg", Stage::GeotagProcess, geotag())
            .unwrap();

        assert_eq!(status, StageStatus::Success);
        let payload = tracker.read_result("a.jpg", Stage::GeotagProcess).unwrap().unwrap();
        assert_eq!(payload.as_geotag(), Some(&geotag()));
    }

    #[test]
    fn test_success_without_payload_is_failure() {
        let tracker = StageTracker::in_memory();
        let status = tracker
            .record_result("a.jpg", Stage::GeotagProcess, StageStatus::Success, None)
            .unwrap();

        assert_eq!(status, StageStatus::Failed);
        assert_eq!(
            tracker.status("a.jpg", Stage::GeotagProcess).unwrap(),
            Some(StageStatus::Failed)
        );
    }

    #[test]
    fn test_failure_supersedes_success() {
        let tracker = StageTracker::in_memory();
        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        tracker.record_failure("a.jpg", Stage::GeotagProcess).unwrap();

        assert!(tracker.read_result("a.jpg", Stage::GeotagProcess).unwrap().is_none());
        let record = tracker.read_record("a.jpg", Stage::GeotagProcess).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Failed);
        assert!(record.payload.is_none());
    }

    #[test]
    fn test_success_supersedes_failure() {
        let tracker = StageTracker::in_memory();
        tracker.record_failure("a.jpg", Stage::GeotagProcess).unwrap();
        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();

        assert_eq!(
            tracker.status("a.jpg", Stage::GeotagProcess).unwrap(),
            Some(StageStatus::Success)
        );
        assert!(tracker
            .with_status(["a.jpg"], Stage::GeotagProcess, StageStatus::Failed)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_should_run_gate() {
        let tracker = StageTracker::in_memory();
        assert!(tracker.should_run("a.jpg", Stage::GeotagProcess, false).unwrap());

        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        assert!(!tracker.should_run("a.jpg", Stage::GeotagProcess, false).unwrap());
        assert!(tracker.should_run("a.jpg", Stage::GeotagProcess, true).unwrap());

        tracker.record_failure("b.jpg", Stage::GeotagProcess).unwrap();
        assert!(tracker.should_run("b.jpg", Stage::GeotagProcess, false).unwrap());
    }

    #[test]
    fn test_uploaded_images_never_rerun() {
        let tracker = StageTracker::in_memory();
        tracker.mark_uploaded("a.jpg").unwrap();

        assert!(!tracker.should_run("a.jpg", Stage::GeotagProcess, true).unwrap());
        assert!(!tracker.should_run("a.jpg", Stage::SequenceProcess, false).unwrap());
    }

    #[test]
    fn test_pending_is_sorted_and_filtered() {
        let tracker = StageTracker::in_memory();
        tracker.record_success("b.jpg", Stage::GeotagProcess, geotag()).unwrap();

        let pending = tracker
            .pending(["c.jpg", "b.jpg", "a.jpg"], Stage::GeotagProcess, false)
            .unwrap();
        assert_eq!(pending, vec!["a.jpg", "c.jpg"]);
    }

    #[test]
    fn test_duplicate_flag() {
        let tracker = StageTracker::in_memory();
        tracker.mark_duplicate("a.jpg").unwrap();

        assert_eq!(tracker.duplicates(["b.jpg", "a.jpg"]).unwrap(), vec!["a.jpg"]);
        assert!(tracker.clear_duplicate("a.jpg").unwrap());
        assert!(!tracker.is_duplicate("a.jpg").unwrap());
        assert!(!tracker.clear_duplicate("a.jpg").unwrap());
    }

    #[test]
    fn test_listener_sees_every_outcome() {
        let listener = Arc::new(RecordingListener::default());
        let tracker = StageTracker::in_memory().with_listener(listener.clone());

        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        assert_eq!(tracker.fail_all(["b.jpg", "c.jpg"], Stage::GeotagProcess), 2);

        let events = listener.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].status, StageStatus::Success);
        assert!(events[0].payload.is_some());
        assert_eq!(events[2].image, "c.jpg");
        assert_eq!(events[2].status, StageStatus::Failed);
    }

    #[test]
    fn test_fs_backed_supersession() {
        let root = std::env::temp_dir().join(format!("geoprep-tracker-{}", uuid::Uuid::new_v4()));
        let tracker = StageTracker::new(Arc::new(FsStore::new(&root)));

        tracker.record_success("x/a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        tracker.record_failure("x/a.jpg", Stage::GeotagProcess).unwrap();

        // A fresh tracker over the same root sees the persisted state
        let reopened = StageTracker::new(Arc::new(FsStore::new(&root)));
        assert_eq!(
            reopened.status("x/a.jpg", Stage::GeotagProcess).unwrap(),
            Some(StageStatus::Failed)
        );
        assert!(reopened.read_result("x/a.jpg", Stage::GeotagProcess).unwrap().is_none());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_unreadable_record_needs_to_run() {
        let tracker = StageTracker::in_memory();
        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        tracker
            .store()
            .put("b.jpg", Stage::GeotagProcess.id(), b"{not json")
            .unwrap();

        assert!(tracker.should_run("b.jpg", Stage::GeotagProcess, false).unwrap());
        assert_eq!(
            tracker
                .pending(["a.jpg", "b.jpg"], Stage::GeotagProcess, false)
                .unwrap(),
            vec!["b.jpg"]
        );

        // The next outcome replaces the broken record
        tracker.record_failure("b.jpg", Stage::GeotagProcess).unwrap();
        assert_eq!(
            tracker.status("b.jpg", Stage::GeotagProcess).unwrap(),
            Some(StageStatus::Failed)
        );
    }

    #[test]
    fn test_geotag_success_clears_duplicate_flag() {
        let tracker = StageTracker::in_memory();
        tracker.mark_duplicate("a.jpg").unwrap();

        tracker.record_failure("a.jpg", Stage::GeotagProcess).unwrap();
        assert!(tracker.is_duplicate("a.jpg").unwrap());

        tracker.record_success("a.jpg", Stage::GeotagProcess, geotag()).unwrap();
        assert!(!tracker.is_duplicate("a.jpg").unwrap());
    }
}
