//! The job model: a user-owned recurring capture task.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique key of a job, stable across edits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the user owning a job.
///
/// The core only ever uses this to resolve a notification address; scheduling
/// never depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a job's trigger is allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Active,
    Paused,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Location of one stored captured image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ArtifactRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ArtifactRef {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One captured artifact in a job's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub location: ArtifactRef,
    pub captured_at: DateTime<Utc>,
}

/// A user-owned recurring capture task.
///
/// `artifacts` is ordered most-recent-first; its growth is bounded by the
/// [`crate::retention::RetentionPolicy`] in force when artifacts are recorded.
/// `error` is empty while the job is healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: OwnerId,
    pub url: String,
    pub title: String,
    /// Free-form recurrence text accepted from the API. How it maps onto an
    /// actual fire schedule is decided by the scheduler's fire-spec policy.
    pub cadence: String,
    pub status: JobStatus,
    pub error: String,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// The most recently captured artifact, if any.
    pub fn latest_artifact(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }
}

/// Input for creating a job. New jobs start active with an empty error and an
/// empty artifact history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub owner: OwnerId,
    pub url: String,
    pub title: String,
    pub cadence: String,
}

/// Partial update for an existing job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub cadence: Option<String>,
}
