//! The durable job-store seam.
//!
//! Everything the core needs from persistence: CRUD over job records plus the
//! capture bookkeeping the pipeline performs on each fire. Document databases,
//! SQL, or anything else can sit behind this trait; [`memory`] provides a
//! correct in-memory implementation for tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    job::{Artifact, Job, JobId, JobPatch, NewJob, OwnerId},
    notify::Address,
    retention::RetentionPolicy,
};

pub mod memory;

/// Durable storage for job records.
///
/// Implementations must be safe for concurrent independent use: fires for
/// distinct jobs hit the store in parallel with no cross-job coordination.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job record.
    ///
    /// Fails with [`StoreError::NotUnique`] when the owner already has a job
    /// with the same url or the same title.
    async fn create(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: &JobId) -> Result<Job, StoreError>;

    /// Applies the patch and returns the updated record. Url and title stay
    /// subject to the per-owner uniqueness rule.
    async fn update(&self, id: &JobId, patch: JobPatch) -> Result<Job, StoreError>;

    /// Removes the record and reclaims its artifact storage. Deleting an
    /// absent job is not an error.
    async fn delete(&self, id: &JobId) -> Result<(), StoreError>;

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Job>, StoreError>;

    /// Prepends the artifact to the job's history, marks the job active,
    /// clears its last error, and applies the retention policy.
    async fn record_artifact(
        &self,
        id: &JobId,
        artifact: Artifact,
        retention: &RetentionPolicy,
    ) -> Result<(), StoreError>;

    /// Pauses the job and records the failure reason as its last error.
    async fn record_failure(&self, id: &JobId, error: &str) -> Result<(), StoreError>;

    /// Resolves the notification address of the job's owner.
    ///
    /// `Ok(None)` means the job exists but its owner has no resolvable
    /// address; callers treat that as "skip owner notification", not as a
    /// failure.
    async fn owner_address(&self, id: &JobId) -> Result<Option<Address>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("a job with the same url or title already exists for this owner")]
    NotUnique,
    #[error("error encoding or decoding job data")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
