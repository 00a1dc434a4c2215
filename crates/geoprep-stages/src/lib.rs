//! Geoprep Stages: geotagging and sequencing of image batches
//!
//! Each stage reads the batch, asks the [`geoprep_core::StageTracker`] which
//! images still need work, and commits one record per image.
//!
//! # Pipeline Flow
//!
//! ```text
//! EXIF / GPX / NMEA / video → GEOTAG → SEQUENCE → Description
//!                               ↓          ↓           ↓
//!                          position   sequence    uploader
//!                          time       duplicates
//! ```

pub mod align;
pub mod description;
pub mod geo;
pub mod geotag;
pub mod sequence;
pub mod source;
pub mod timestamps;
pub mod video;

pub use align::{align_offset, OffsetSource, TimeAlignment};
pub use description::{final_description, ImageDescription};
pub use geo::{GeoError, Interpolated, TracePoint};
pub use geotag::{GeotagOrchestrator, GeotagReport, ImageFailure};
pub use sequence::{
    split_sequences, Cutoffs, GeotagPoint, Sequence, SequenceProcessor, SequenceReport,
};
pub use source::{
    ExifError, ExifReader, ExifTags, TraceError, TraceFormat, TraceReader, VideoTelemetry,
    VideoTrace,
};
pub use timestamps::interpolate_timestamps;
pub use video::frames_for_video;

use geoprep_core::{ProcessError, SequenceOptions, StageTracker};

/// Run the sequence stage over `images` with `options`.
pub fn process_sequences(
    tracker: &StageTracker,
    images: &[String],
    options: &SequenceOptions,
) -> Result<SequenceReport, ProcessError> {
    SequenceProcessor::new(tracker, options.clone()).process(images)
}
