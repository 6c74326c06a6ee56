//! Remote segmentation modes, job states and queue states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the remote segmentation job produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Foreground person over a flat matte.
    Foreground,
    /// Foreground composited server-side over the referenced background.
    Combination {
        /// Publicly reachable URL of the background image.
        background_url: String,
    },
}

impl SegmentationMode {
    /// Wire name used by the remote service.
    pub fn wire_name(&self) -> &'static str {
        match self {
            SegmentationMode::Foreground => "Foreground",
            SegmentationMode::Combination { .. } => "Combination",
        }
    }

    pub fn background_url(&self) -> Option<&str> {
        match self {
            SegmentationMode::Foreground => None,
            SegmentationMode::Combination { background_url } => Some(background_url),
        }
    }
}

/// Lifecycle of a remote segmentation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationState {
    /// Known locally, not yet accepted by the service
    Created,
    Submitted,
    Running,
    Success,
    Failed,
    /// Unrecognized state string from the service
    Unknown,
}

impl SegmentationState {
    /// Map a state string reported by the service.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "Submitted" => SegmentationState::Submitted,
            "Running" => SegmentationState::Running,
            "Success" => SegmentationState::Success,
            "Failed" => SegmentationState::Failed,
            _ => SegmentationState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationState::Created => "created",
            SegmentationState::Submitted => "submitted",
            SegmentationState::Running => "running",
            SegmentationState::Success => "success",
            SegmentationState::Failed => "failed",
            SegmentationState::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentationState::Success | SegmentationState::Failed)
    }

    /// Forward-only transition check. `Unknown` observations never move the
    /// job backwards and never end it.
    pub fn can_transition_to(&self, next: SegmentationState) -> bool {
        use SegmentationState::*;
        match (self, next) {
            (Success | Failed, _) => false,
            (_, Unknown) => false,
            (Created, Submitted | Running | Success | Failed) => true,
            (Submitted, Running | Success | Failed) => true,
            (Running, Success | Failed) => true,
            (Unknown, Submitted | Running | Success | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SegmentationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a processing queue on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum QueueState {
    Active,
    Paused,
    Other,
}

impl QueueState {
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "Active" => QueueState::Active,
            "Paused" => QueueState::Paused,
            _ => QueueState::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_wire() {
        assert_eq!(SegmentationState::from_wire("Running"), SegmentationState::Running);
        assert_eq!(SegmentationState::from_wire("Pausing"), SegmentationState::Unknown);
    }

    #[test]
    fn test_forward_only_transitions() {
        use SegmentationState::*;
        assert!(Created.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Success));
        assert!(!Running.can_transition_to(Submitted));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Unknown));
    }

    #[test]
    fn test_mode_wire_names() {
        let combo = SegmentationMode::Combination {
            background_url: "https://b/bg.png".into(),
        };
        assert_eq!(combo.wire_name(), "Combination");
        assert_eq!(combo.background_url(), Some("https://b/bg.png"));
        assert_eq!(SegmentationMode::Foreground.background_url(), None);
    }
}
