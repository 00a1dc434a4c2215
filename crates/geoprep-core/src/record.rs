//! Record Model: stage envelope and per-stage payloads
//!
//! Payload keys follow the upload service's image description format, so the
//! JSON written by a stage can be merged into the final description as is.
use crate::stage::{Stage, StageStatus};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format of `MAPCaptureTime`, millisecond precision.
pub const CAPTURE_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%3f";

/// One outcome per (image, stage). Written whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub image: String,
    pub stage: Stage,
    pub status: StageStatus,
    /// Present only when `status` is success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
    pub timestamp: DateTime<Utc>,
}

impl StageRecord {
    pub fn success(image: impl Into<String>, stage: Stage, payload: StagePayload) -> Self {
        Self {
            image: image.into(),
            stage,
            status: StageStatus::Success,
            payload: Some(payload),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(image: impl Into<String>, stage: Stage) -> Self {
        Self {
            image: image.into(),
            stage,
            status: StageStatus::Failed,
            payload: None,
            timestamp: Utc::now(),
        }
    }
}

/// Stage result, tagged by the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Geotag(GeotagPayload),
    Sequence(SequencePayload),
}

impl StagePayload {
    pub fn as_geotag(&self) -> Option<&GeotagPayload> {
        match self {
            Self::Geotag(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequencePayload> {
        match self {
            Self::Sequence(p) => Some(p),
            _ => None,
        }
    }
}

impl From<GeotagPayload> for StagePayload {
    fn from(p: GeotagPayload) -> Self {
        Self::Geotag(p)
    }
}

impl From<SequencePayload> for StagePayload {
    fn from(p: SequencePayload) -> Self {
        Self::Sequence(p)
    }
}

/// True and magnetic heading in degrees, `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompassHeading {
    #[serde(rename = "TrueHeading")]
    pub true_heading: f64,
    #[serde(rename = "MagneticHeading")]
    pub magnetic_heading: f64,
}

impl CompassHeading {
    /// Same value for true and magnetic heading.
    pub fn uniform(heading: f64) -> Self {
        Self {
            true_heading: heading,
            magnetic_heading: heading,
        }
    }
}

/// Result of `geotag_process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeotagPayload {
    #[serde(rename = "MAPLatitude")]
    pub latitude: f64,

    #[serde(rename = "MAPLongitude")]
    pub longitude: f64,

    #[serde(rename = "MAPCaptureTime", with = "capture_time")]
    pub capture_time: NaiveDateTime,

    /// Absent when neither EXIF nor the trace carried an elevation
    #[serde(rename = "MAPAltitude", default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    #[serde(
        rename = "MAPCompassHeading",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub compass_heading: Option<CompassHeading>,
}

/// Result of `sequence_process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePayload {
    #[serde(rename = "MAPSequenceUUID")]
    pub sequence_uuid: Uuid,

    /// Capture time after duplicate-timestamp disambiguation
    #[serde(rename = "MAPCaptureTime", with = "capture_time")]
    pub capture_time: NaiveDateTime,

    #[serde(
        rename = "MAPCompassHeading",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub compass_heading: Option<CompassHeading>,
}

/// Side flags that are not stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Duplicate,
    UploadSuccess,
}

impl Flag {
    pub fn slot(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::UploadSuccess => "upload_success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub image: String,
    pub flag: Flag,
    pub timestamp: DateTime<Utc>,
}

pub fn format_capture_time(t: &NaiveDateTime) -> String {
    t.format(CAPTURE_TIME_FORMAT).to_string()
}

pub fn parse_capture_time(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, CAPTURE_TIME_FORMAT)
}

/// Serde adapter for `MAPCaptureTime` strings.
pub mod capture_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_capture_time(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_capture_time(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 3, 14)
            .unwrap()
            .and_hms_milli_opt(15, 9, 26, 535)
            .unwrap()
    }

    #[test]
    fn test_capture_time_format() {
        assert_eq!(format_capture_time(&sample_time()), "2020_03_14_15_09_26_535");
        assert_eq!(parse_capture_time("2020_03_14_15_09_26_535").unwrap(), sample_time());
    }

    #[test]
    fn test_absent_optional_fields_are_omitted() {
        let payload = GeotagPayload {
            latitude: 55.6,
            longitude: 13.0,
            capture_time: sample_time(),
            altitude: None,
            compass_heading: None,
        };
        let value = serde_json::to_value(StagePayload::from(payload)).unwrap();

        assert_eq!(value["kind"], "geotag");
        assert_eq!(value["MAPLatitude"], 55.6);
        assert!(value.get("MAPAltitude").is_none());
        assert!(value.get("MAPCompassHeading").is_none());
    }

    #[test]
    fn test_heading_wire_keys() {
        let value = serde_json::to_value(CompassHeading::uniform(12.5)).unwrap();
        assert_eq!(value["TrueHeading"], 12.5);
        assert_eq!(value["MagneticHeading"], 12.5);
    }
}
