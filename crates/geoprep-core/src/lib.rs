//! Geoprep Core: Stage Tracker, Record Model and Storage
//!
//! Durable per-image ledger behind every processing stage. Stages ask the
//! [`StageTracker`] whether an image still needs work, and commit each
//! outcome back through it, so an interrupted batch resumes where it stopped.

pub mod config;
pub mod error;
pub mod listener;
pub mod record;
pub mod stage;
pub mod store;
pub mod telemetry;
pub mod tracker;

pub use config::{GeotagOptions, ProcessConfig, SequenceOptions};
pub use error::{ImageError, ProcessError, StoreError};
pub use listener::{ChannelListener, NoopListener, StageEvent, StageListener, TracingListener};
pub use record::{
    CompassHeading, Flag, GeotagPayload, SequencePayload, StagePayload, StageRecord,
};
pub use stage::{Stage, StageStatus};
pub use store::{FsStore, MemoryStore, RecordStore};
pub use tracker::StageTracker;

/// Geoprep engine version
pub const GEOPREP_VERSION: &str = "1.0.0";
