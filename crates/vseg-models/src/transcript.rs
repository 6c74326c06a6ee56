//! Transcript segments produced by the speech-recognition collaborator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One timed piece of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Segments with a negative span or blank text are dropped by consumers.
    pub fn is_valid(&self) -> bool {
        self.start >= 0.0 && self.end >= self.start && !self.text.trim().is_empty()
    }
}
