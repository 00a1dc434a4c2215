//! Unified Error Model
//!
//! Two channels: [`ImageError`] is scoped to one image and ends up recorded as
//! a failed stage, [`ProcessError`] invalidates the whole run and goes back to
//! the caller before any per-image work starts.
use std::path::PathBuf;
use thiserror::Error;

/// Record storage failures (backend I/O or JSON codec).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("STORE/IO {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("STORE/CODEC: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("STORE/POISONED: {0}")]
    Poisoned(String),
}

/// Failure localized to a single image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("EXIF/MISSING: {image} has no {field} tag, which is required")]
    MissingField { image: String, field: &'static str },

    #[error("EXIF/READ: {image}: {reason}")]
    Exif { image: String, reason: String },

    #[error("GEO/INTERPOLATE: {image}: {hint}")]
    Interpolation { image: String, hint: String },

    #[error("STAGE/FAILED: required {stage} failed for {image}")]
    StageFailed { image: String, stage: String },

    #[error("STAGE/MISSING: required {stage} has no result for {image}")]
    StageMissing { image: String, stage: String },

    #[error("STORE/{image}: {source}")]
    Store {
        image: String,
        #[source]
        source: StoreError,
    },
}

impl ImageError {
    /// Identifier of the image the error belongs to.
    pub fn image(&self) -> &str {
        match self {
            Self::MissingField { image, .. }
            | Self::Exif { image, .. }
            | Self::Interpolation { image, .. }
            | Self::StageFailed { image, .. }
            | Self::StageMissing { image, .. }
            | Self::Store { image, .. } => image,
        }
    }
}

/// Failure that aborts the invoking stage.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("SOURCE/MISSING: {description} is required to be specified as the geotag source path")]
    SourceMissing { description: &'static str },

    #[error("SOURCE/INVALID: the geotag source path {} is not {description}", path.display())]
    InvalidSource {
        path: PathBuf,
        description: &'static str,
    },

    #[error("SOURCE/UNKNOWN: invalid geotag source {0}")]
    UnknownSource(String),

    #[error("SOURCE/NOT_DIR: the geotag source path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("SOURCE/EXIF: no image in the batch has both capture time and position")]
    EmptyExifTrace,

    #[error("CONFIG/{0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
