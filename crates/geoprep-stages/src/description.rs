//! Final image description handed to the uploader
//!
//! Merges the `geotag_process` and `sequence_process` results. The sequence
//! stage wins on capture time and heading, since it resolves duplicate
//! timestamps and may have recomputed directions.
use chrono::NaiveDateTime;
use geoprep_core::{CompassHeading, ImageError, Stage, StagePayload, StageTracker};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescription {
    #[serde(rename = "MAPLatitude")]
    pub latitude: f64,

    #[serde(rename = "MAPLongitude")]
    pub longitude: f64,

    #[serde(rename = "MAPCaptureTime", with = "geoprep_core::record::capture_time")]
    pub capture_time: NaiveDateTime,

    #[serde(rename = "MAPAltitude", default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    #[serde(
        rename = "MAPCompassHeading",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub compass_heading: Option<CompassHeading>,

    #[serde(rename = "MAPSequenceUUID")]
    pub sequence_uuid: Uuid,

    #[serde(rename = "MAPPhotoUUID")]
    pub photo_uuid: Uuid,
}

/// Build the description of `image` from its stage records.
///
/// Both stages must have succeeded. Each call mints a new photo UUID.
pub fn final_description(
    tracker: &StageTracker,
    image: &str,
) -> Result<ImageDescription, ImageError> {
    let geotag = match required(tracker, image, Stage::GeotagProcess)? {
        StagePayload::Geotag(geotag) => geotag,
        StagePayload::Sequence(_) => return Err(stage_failed(image, Stage::GeotagProcess)),
    };
    let sequence = match required(tracker, image, Stage::SequenceProcess)? {
        StagePayload::Sequence(sequence) => sequence,
        StagePayload::Geotag(_) => return Err(stage_failed(image, Stage::SequenceProcess)),
    };

    Ok(ImageDescription {
        latitude: geotag.latitude,
        longitude: geotag.longitude,
        capture_time: sequence.capture_time,
        altitude: geotag.altitude,
        compass_heading: sequence.compass_heading.or(geotag.compass_heading),
        sequence_uuid: sequence.sequence_uuid,
        photo_uuid: Uuid::new_v4(),
    })
}

fn required(tracker: &StageTracker, image: &str, stage: Stage) -> Result<StagePayload, ImageError> {
    let record = tracker
        .read_record(image, stage)
        .map_err(|source| ImageError::Store {
            image: image.to_string(),
            source,
        })?
        .ok_or_else(|| ImageError::StageMissing {
            image: image.to_string(),
            stage: stage.to_string(),
        })?;

    match record.payload {
        Some(payload) if record.status.is_success() => Ok(payload),
        _ => Err(stage_failed(image, stage)),
    }
}

fn stage_failed(image: &str, stage: Stage) -> ImageError {
    ImageError::StageFailed {
        image: image.to_string(),
        stage: stage.to_string(),
    }
}
