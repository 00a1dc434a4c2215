//! Stage names and outcomes tracked per image
use serde::{Deserialize, Serialize};

/// A named step of the per-image pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GeotagProcess,
    SequenceProcess,
}

impl Stage {
    /// Stable identifier, also used as the storage slot name.
    pub fn id(&self) -> &'static str {
        match self {
            Self::GeotagProcess => "geotag_process",
            Self::SequenceProcess => "sequence_process",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Binary outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ids() {
        assert_eq!(Stage::GeotagProcess.id(), "geotag_process");
        assert_eq!(Stage::SequenceProcess.to_string(), "sequence_process");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&StageStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }
}
