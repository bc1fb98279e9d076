//! An in memory implementation of [`JobStore`].
//!
//! Provided as a correct (but not optimized) implementation primarily for use
//! in tests and example setups.
//!
//! **This is not designed for use in a production system.**

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, RwLock,
};

use async_trait::async_trait;
use chrono::Utc;
use fxhash::FxHashMap;

use crate::{
    job::{Artifact, Job, JobId, JobPatch, JobStatus, NewJob, OwnerId},
    notify::Address,
    retention::RetentionPolicy,
    store::{JobStore, StoreError},
};

/// An in memory [`JobStore`].
///
/// Clones share state, so a test can hand one clone to the scheduler and keep
/// another for assertions. Owner addresses are registered up front with
/// [`InMemoryJobStore::insert_owner`]; jobs whose owner was never registered
/// resolve to no address.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<FxHashMap<JobId, Job>>>,
    owners: Arc<RwLock<FxHashMap<OwnerId, Address>>>,
    id_counter: Arc<AtomicI64>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the notification address of an owner.
    pub fn insert_owner(&self, owner: OwnerId, address: Address) -> Result<(), StoreError> {
        self.owners
            .write()
            .map_err(|_| StoreError::Unavailable("owner registry lock poisoned".to_owned()))?
            .insert(owner, address);
        Ok(())
    }

    fn check_unique(
        jobs: &FxHashMap<JobId, Job>,
        owner: &OwnerId,
        url: &str,
        title: &str,
        exclude: Option<&JobId>,
    ) -> Result<(), StoreError> {
        let clash = jobs.values().any(|job| {
            job.owner == *owner
                && Some(&job.id) != exclude
                && (job.url == url || job.title == title)
        });
        if clash {
            Err(StoreError::NotUnique)
        } else {
            Ok(())
        }
    }
}

fn poisoned(_: impl Sized) -> StoreError {
    StoreError::Unavailable("job store lock poisoned".to_owned())
}

impl Job {
    fn record_artifact(&mut self, artifact: Artifact, retention: &RetentionPolicy) {
        self.artifacts.insert(0, artifact);
        self.status = JobStatus::Active;
        self.error.clear();
        retention.apply(&mut self.artifacts, Utc::now());
    }

    fn record_failure(&mut self, error: &str) {
        self.status = JobStatus::Paused;
        self.error = error.to_owned();
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        Self::check_unique(&jobs, &new.owner, &new.url, &new.title, None)?;

        let id = JobId::from(self.id_counter.fetch_add(1, Ordering::SeqCst).to_string());
        let job = Job {
            id: id.clone(),
            owner: new.owner,
            url: new.url,
            title: new.title,
            cadence: new.cadence,
            status: JobStatus::Active,
            error: String::new(),
            artifacts: Vec::new(),
            created_at: Utc::now(),
        };
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))
    }

    async fn update(&self, id: &JobId, patch: JobPatch) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;

        let (owner, url, title) = match jobs.get(id) {
            None => return Err(StoreError::JobNotFound(id.clone())),
            Some(job) => (
                job.owner.clone(),
                patch.url.clone().unwrap_or_else(|| job.url.clone()),
                patch.title.clone().unwrap_or_else(|| job.title.clone()),
            ),
        };
        Self::check_unique(&jobs, &owner, &url, &title, Some(id))?;

        match jobs.get_mut(id) {
            None => Err(StoreError::JobNotFound(id.clone())),
            Some(job) => {
                job.url = url;
                job.title = title;
                if let Some(cadence) = patch.cadence {
                    job.cadence = cadence;
                }
                Ok(job.clone())
            }
        }
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        // dropping the record drops its artifact history with it
        self.jobs.write().map_err(poisoned)?.remove(id);
        Ok(())
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|job| job.owner == *owner)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn record_artifact(
        &self,
        id: &JobId,
        artifact: Artifact,
        retention: &RetentionPolicy,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(id) {
            None => Err(StoreError::JobNotFound(id.clone())),
            Some(job) => {
                job.record_artifact(artifact, retention);
                Ok(())
            }
        }
    }

    async fn record_failure(&self, id: &JobId, error: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(id) {
            None => Err(StoreError::JobNotFound(id.clone())),
            Some(job) => {
                job.record_failure(error);
                Ok(())
            }
        }
    }

    async fn owner_address(&self, id: &JobId) -> Result<Option<Address>, StoreError> {
        let owner = self.get(id).await?.owner;
        Ok(self
            .owners
            .read()
            .map_err(poisoned)?
            .get(&owner)
            .cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn new_job(owner: &str, url: &str, title: &str) -> NewJob {
        NewJob {
            owner: owner.into(),
            url: url.to_owned(),
            title: title.to_owned(),
            cadence: "daily".to_owned(),
        }
    }

    fn artifact(location: &str) -> Artifact {
        Artifact {
            location: location.into(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn created_jobs_start_active_and_empty() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.error, "");
        assert!(job.artifacts.is_empty());
        assert_eq!(store.get(&job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn owners_cannot_reuse_a_url_or_title() {
        let store = InMemoryJobStore::new();
        store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();

        assert_matches!(
            store
                .create(new_job("ana", "http://example.com", "Different title"))
                .await,
            Err(StoreError::NotUnique)
        );
        assert_matches!(
            store
                .create(new_job("ana", "http://other.example", "Example"))
                .await,
            Err(StoreError::NotUnique)
        );
        // a different owner can use both
        assert_matches!(
            store
                .create(new_job("bob", "http://example.com", "Example"))
                .await,
            Ok(_)
        );
    }

    #[tokio::test]
    async fn update_patches_fields_and_keeps_uniqueness() {
        let store = InMemoryJobStore::new();
        let first = store
            .create(new_job("ana", "http://one.example", "One"))
            .await
            .unwrap();
        let second = store
            .create(new_job("ana", "http://two.example", "Two"))
            .await
            .unwrap();

        let updated = store
            .update(
                &second.id,
                JobPatch {
                    url: Some("http://three.example".to_owned()),
                    cadence: Some("07:30".to_owned()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.url, "http://three.example");
        assert_eq!(updated.title, "Two");
        assert_eq!(updated.cadence, "07:30");

        // patching onto a sibling's url is rejected
        assert_matches!(
            store
                .update(
                    &second.id,
                    JobPatch {
                        url: Some(first.url.clone()),
                        ..Default::default()
                    },
                )
                .await,
            Err(StoreError::NotUnique)
        );

        // a job may keep its own url through an update
        assert_matches!(
            store
                .update(
                    &second.id,
                    JobPatch {
                        url: Some("http://three.example".to_owned()),
                        ..Default::default()
                    },
                )
                .await,
            Ok(_)
        );
    }

    #[tokio::test]
    async fn missing_jobs_are_reported() {
        let store = InMemoryJobStore::new();
        let id = JobId::from("missing");

        assert_matches!(store.get(&id).await, Err(StoreError::JobNotFound(_)));
        assert_matches!(
            store.update(&id, JobPatch::default()).await,
            Err(StoreError::JobNotFound(_))
        );
        assert_matches!(
            store
                .record_artifact(&id, artifact("a.png"), &RetentionPolicy::KeepAll)
                .await,
            Err(StoreError::JobNotFound(_))
        );
        assert_matches!(
            store.record_failure(&id, "DNS error").await,
            Err(StoreError::JobNotFound(_))
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();

        store.delete(&job.id).await.unwrap();
        assert_matches!(store.get(&job.id).await, Err(StoreError::JobNotFound(_)));
        store.delete(&job.id).await.unwrap();
    }

    #[tokio::test]
    async fn recording_an_artifact_heals_the_job() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();
        store.record_failure(&job.id, "DNS error").await.unwrap();

        store
            .record_artifact(&job.id, artifact("a1.png"), &RetentionPolicy::KeepAll)
            .await
            .unwrap();
        store
            .record_artifact(&job.id, artifact("a2.png"), &RetentionPolicy::KeepAll)
            .await
            .unwrap();

        let stored = store.get(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Active);
        assert_eq!(stored.error, "");
        let locations: Vec<_> = stored
            .artifacts
            .iter()
            .map(|artifact| artifact.location.as_str())
            .collect();
        assert_eq!(locations, vec!["a2.png", "a1.png"]);
    }

    #[tokio::test]
    async fn recording_an_artifact_applies_retention() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();

        for n in 0..5 {
            store
                .record_artifact(
                    &job.id,
                    artifact(&format!("a{n}.png")),
                    &RetentionPolicy::MaxCount(3),
                )
                .await
                .unwrap();
        }

        let stored = store.get(&job.id).await.unwrap();
        assert_eq!(stored.artifacts.len(), 3);
        assert_eq!(stored.artifacts[0].location.as_str(), "a4.png");
    }

    #[tokio::test]
    async fn recording_a_failure_pauses_the_job() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();

        store.record_failure(&job.id, "DNS error").await.unwrap();

        let stored = store.get(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Paused);
        assert_eq!(stored.error, "DNS error");
    }

    #[tokio::test]
    async fn owner_addresses_resolve_only_when_registered() {
        let store = InMemoryJobStore::new();
        store
            .insert_owner("ana".into(), "ana@example.com".into())
            .unwrap();
        let known = store
            .create(new_job("ana", "http://example.com", "Example"))
            .await
            .unwrap();
        let unknown = store
            .create(new_job("ghost", "http://ghost.example", "Ghost"))
            .await
            .unwrap();

        assert_eq!(
            store.owner_address(&known.id).await.unwrap(),
            Some("ana@example.com".into())
        );
        assert_eq!(store.owner_address(&unknown.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_by_owner_filters() {
        let store = InMemoryJobStore::new();
        let ana = store
            .create(new_job("ana", "http://one.example", "One"))
            .await
            .unwrap();
        store
            .create(new_job("bob", "http://two.example", "Two"))
            .await
            .unwrap();

        let jobs = store.list_by_owner(&"ana".into()).await.unwrap();
        assert_eq!(jobs, vec![ana]);
    }
}
