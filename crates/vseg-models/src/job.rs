//! Job identity and compositing strategy.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, filesystem and object-key friendly suffix for this job.
    ///
    /// Combines the job's start timestamp with the first block of the ID so
    /// keys sort by creation time but never collide between jobs. Every key
    /// of one job must be built from the same `started_at`.
    pub fn key_suffix(&self, started_at: DateTime<Utc>) -> String {
        let head = self.0.split('-').next().unwrap_or(&self.0);
        format!("{}_{}", started_at.timestamp(), head)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where the foreground is composited over a user background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompositeStrategy {
    /// The remote service composites (Combination mode).
    #[default]
    Server,
    /// The remote service only cuts out the foreground; placement and
    /// rendering happen locally using the geometry engine.
    Local,
}

impl CompositeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeStrategy::Server => "server",
            CompositeStrategy::Local => "local",
        }
    }

    /// Parse a configuration value, falling back to `Server`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => CompositeStrategy::Local,
            _ => CompositeStrategy::Server,
        }
    }
}
