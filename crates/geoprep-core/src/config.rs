//! Processing configuration
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! geotag:
//!   offset_time: -3.5
//!   use_trace_start_time: true
//! sequence:
//!   cutoff_distance: 300.0
//! ```
use crate::error::ProcessError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub geotag: GeotagOptions,
    pub sequence: SequenceOptions,
}

/// Options of the `geotag_process` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeotagOptions {
    /// Seconds subtracted from every image capture time before interpolation
    pub offset_time: f64,

    /// Degrees added to every heading, result normalized into [0, 360)
    pub offset_angle: f64,

    /// Align the earliest image with the first trace point
    pub use_trace_start_time: bool,

    /// Trace timestamps are local time rather than UTC
    pub local_time: bool,

    pub rerun: bool,
}

impl Default for GeotagOptions {
    fn default() -> Self {
        Self {
            offset_time: 0.0,
            offset_angle: 0.0,
            use_trace_start_time: false,
            local_time: false,
            rerun: false,
        }
    }
}

/// Options of the `sequence_process` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Seconds; derived from the batch when unset
    pub cutoff_time: Option<f64>,

    /// Meters; distance cuts are disabled when unset
    pub cutoff_distance: Option<f64>,

    /// Meters below which consecutive images count as duplicates
    pub duplicate_distance: f64,

    /// Degrees of heading change below which consecutive images count as duplicates
    pub duplicate_angle: f64,

    /// Replace headings with the bearing toward the next image
    pub interpolate_directions: bool,

    /// Degrees added to interpolated headings
    pub offset_angle: f64,

    pub rerun: bool,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            cutoff_time: None,
            cutoff_distance: Some(600.0),
            duplicate_distance: 0.1,
            duplicate_angle: 5.0,
            interpolate_directions: false,
            offset_angle: 0.0,
            rerun: false,
        }
    }
}

impl ProcessConfig {
    /// Load configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ProcessError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ProcessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ProcessError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        let positive = |name: &str, value: Option<f64>| match value {
            Some(v) if !(v.is_finite() && v > 0.0) => Err(ProcessError::Config(format!(
                "{} must be a positive number, got {}",
                name, v
            ))),
            _ => Ok(()),
        };
        positive("sequence.cutoff_time", self.sequence.cutoff_time)?;
        positive("sequence.cutoff_distance", self.sequence.cutoff_distance)?;

        if !self.geotag.offset_time.is_finite() || !self.geotag.offset_angle.is_finite() {
            return Err(ProcessError::Config("geotag offsets must be finite".to_string()));
        }
        if self.sequence.duplicate_distance < 0.0 || self.sequence.duplicate_angle < 0.0 {
            return Err(ProcessError::Config(
                "duplicate thresholds must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessConfig::default();
        assert_eq!(config.geotag.offset_time, 0.0);
        assert_eq!(config.sequence.cutoff_time, None);
        assert_eq!(config.sequence.cutoff_distance, Some(600.0));
        assert_eq!(config.sequence.duplicate_angle, 5.0);
    }

    #[test]
    fn test_partial_yaml() {
        let config = ProcessConfig::from_yaml(
            "geotag:\n  offset_time: -3.5\n  use_trace_start_time: true\nsequence:\n  cutoff_time: 4.0\n",
        )
        .unwrap();

        assert_eq!(config.geotag.offset_time, -3.5);
        assert!(config.geotag.use_trace_start_time);
        assert_eq!(config.sequence.cutoff_time, Some(4.0));
        assert_eq!(config.sequence.cutoff_distance, Some(600.0));
    }

    #[test]
    fn test_null_disables_distance_cut() {
        let config = ProcessConfig::from_yaml("sequence:\n  cutoff_distance: null\n").unwrap();
        assert_eq!(config.sequence.cutoff_distance, None);
    }

    #[test]
    fn test_rejects_non_positive_cutoff() {
        let err = ProcessConfig::from_yaml("sequence:\n  cutoff_time: 0\n").unwrap_err();
        assert!(err.to_string().contains("cutoff_time"));
    }
}
