//! External collaborators: EXIF codec, trace readers and video telemetry
//!
//! Only the contracts live here. Parsing GPX, NMEA or camera telemetry is the
//! job of the implementations plugged in by the caller.
use crate::geo::TracePoint;
use chrono::NaiveDateTime;
use geoprep_core::ProcessError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Tags read from one image. Every tag may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifTags {
    pub capture_time: Option<NaiveDateTime>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<f64>,
    pub direction: Option<f64>,
}

impl ExifTags {
    /// `(lat, lon)` when both are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("EXIF could not be read: {0}")]
pub struct ExifError(pub String);

pub trait ExifReader: Send + Sync {
    fn read(&self, image: &str) -> Result<ExifTags, ExifError>;
}

/// Pre-extracted tags keyed by image identifier.
impl ExifReader for HashMap<String, ExifTags> {
    fn read(&self, image: &str) -> Result<ExifTags, ExifError> {
        self.get(image)
            .cloned()
            .ok_or_else(|| ExifError(format!("no EXIF data for {}", image)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    Gpx,
    Nmea,
}

impl TraceFormat {
    /// Human description used in diagnostics.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Gpx => "a GPX file",
            Self::Nmea => "an NMEA file",
        }
    }
}

impl FromStr for TraceFormat {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpx" => Ok(Self::Gpx),
            "nmea" => Ok(Self::Nmea),
            _ => Err(ProcessError::UnknownSource(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error("TRACE/UNREADABLE {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Reads a GPX or NMEA file into a trace sorted by ascending time.
pub trait TraceReader: Send + Sync {
    fn read(
        &self,
        format: TraceFormat,
        path: &Path,
        local_time: bool,
    ) -> Result<Vec<TracePoint>, TraceError>;
}

impl<F> TraceReader for F
where
    F: Fn(TraceFormat, &Path, bool) -> Result<Vec<TracePoint>, TraceError> + Send + Sync,
{
    fn read(
        &self,
        format: TraceFormat,
        path: &Path,
        local_time: bool,
    ) -> Result<Vec<TracePoint>, TraceError> {
        self(format, path, local_time)
    }
}

/// Trace recovered from a video's onboard telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrace {
    pub points: Vec<TracePoint>,
    /// The camera did not move during the recording
    pub stationary: bool,
}

pub trait VideoTelemetry: Send + Sync {
    /// Videos found under `dir`.
    fn list_videos(&self, dir: &Path) -> Result<Vec<PathBuf>, TraceError>;

    fn extract(&self, video: &Path) -> Result<VideoTrace, TraceError>;
}
