//! The capture-engine seam.
//!
//! An engine performs exactly one capture attempt for one job: drive a
//! headless browser at the target URL, store the resulting image under a
//! job-scoped location, and hand back a reference to it. Browser mechanics
//! (viewport, page-load strategy, storage layout) belong entirely to the
//! implementation; the core only sees this contract.

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;

use crate::job::{ArtifactRef, JobId};

/// Performs one webpage capture attempt.
///
/// A capture may legitimately run longer than the job's firing interval; the
/// trigger table serialises occurrences of the same job around it.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    async fn capture(&self, url: &str, job: &JobId) -> Result<ArtifactRef, CaptureFailed>;
}

/// A failed capture attempt.
///
/// A capture failure is terminal for the job's schedule: the pipeline pauses
/// the job and its trigger is removed until the job is edited again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CaptureFailed {
    pub reason: String,
}

impl CaptureFailed {
    /// Reason recorded when the engine reports no detail of its own.
    pub const DEFAULT_REASON: &'static str = "URL is not valid";

    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The failure reason, falling back to [`Self::DEFAULT_REASON`] when the
    /// engine supplied none.
    pub fn reason(&self) -> &str {
        if self.reason.is_empty() {
            Self::DEFAULT_REASON
        } else {
            &self.reason
        }
    }
}

const ARTIFACT_NAME_LEN: usize = 10;

/// A fresh job-scoped artifact location: `screenshots/<job>/<random>.png`.
///
/// Engines are free to use any naming scheme; this one keeps all of a job's
/// artifacts under one reclaimable directory.
pub fn artifact_location(job: &JobId) -> ArtifactRef {
    let name: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ARTIFACT_NAME_LEN)
        .map(char::from)
        .collect();
    ArtifactRef::from(format!("screenshots/{job}/{name}.png"))
}
