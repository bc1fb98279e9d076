//! Test doubles for the capture, notification, and persistence seams.
//!
//! These are scripted fakes rather than assertion frameworks: they record
//! what the pipeline did and return whatever outcome the test arranged. Host
//! applications can use them to test their own wiring the same way this
//! crate's tests do.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use fxhash::FxHashMap;

use crate::{
    capture::{artifact_location, CaptureEngine, CaptureFailed},
    job::{Artifact, ArtifactRef, Job, JobId, JobPatch, NewJob, OwnerId},
    notify::{Address, Notification, Notifier, NotifyError},
    retention::RetentionPolicy,
    store::{JobStore, StoreError},
};

#[derive(Clone, Default)]
struct JobBehavior {
    /// `None` means unscripted: succeed with a fresh [`artifact_location`].
    outcome: Option<Result<ArtifactRef, CaptureFailed>>,
    latency: Duration,
    calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// A [`CaptureEngine`] returning scripted outcomes per job.
///
/// Unscripted jobs succeed with a fresh [`artifact_location`]. The engine
/// also tracks, per job, how many captures ran and how many ran at once, so
/// tests can assert on firing cadence and overlap.
#[derive(Clone, Default)]
pub struct StubCaptureEngine {
    behaviors: Arc<Mutex<FxHashMap<JobId, JobBehavior>>>,
}

impl StubCaptureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every capture for the job return the given location.
    pub fn succeed(&self, job: &JobId, location: &str) {
        self.behavior(job, |behavior| behavior.outcome = Some(Ok(location.into())));
    }

    /// Makes every capture for the job fail with the given reason.
    pub fn fail(&self, job: &JobId, reason: &str) {
        self.behavior(job, |behavior| {
            behavior.outcome = Some(Err(CaptureFailed::new(reason)))
        });
    }

    /// Makes captures for the job take this long.
    pub fn set_latency(&self, job: &JobId, latency: Duration) {
        self.behavior(job, |behavior| behavior.latency = latency);
    }

    /// Number of captures started for the job.
    pub fn calls(&self, job: &JobId) -> usize {
        self.behaviors
            .lock()
            .expect("engine lock poisoned")
            .get(job)
            .map(|behavior| behavior.calls)
            .unwrap_or(0)
    }

    /// The most captures that ever ran at once for the job.
    pub fn max_in_flight(&self, job: &JobId) -> usize {
        self.behaviors
            .lock()
            .expect("engine lock poisoned")
            .get(job)
            .map(|behavior| behavior.max_in_flight)
            .unwrap_or(0)
    }

    fn behavior(&self, job: &JobId, configure: impl FnOnce(&mut JobBehavior)) {
        let mut behaviors = self.behaviors.lock().expect("engine lock poisoned");
        configure(behaviors.entry(job.clone()).or_default());
    }
}

#[async_trait]
impl CaptureEngine for StubCaptureEngine {
    async fn capture(&self, _url: &str, job: &JobId) -> Result<ArtifactRef, CaptureFailed> {
        let (outcome, latency) = {
            let mut behaviors = self.behaviors.lock().expect("engine lock poisoned");
            let behavior = behaviors.entry(job.clone()).or_default();
            behavior.calls += 1;
            behavior.in_flight += 1;
            behavior.max_in_flight = behavior.max_in_flight.max(behavior.in_flight);
            let outcome = behavior
                .outcome
                .clone()
                .unwrap_or_else(|| Ok(artifact_location(job)));
            (outcome, behavior.latency)
        };

        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        self.behaviors
            .lock()
            .expect("engine lock poisoned")
            .entry(job.clone())
            .and_modify(|behavior| behavior.in_flight -= 1);
        outcome
    }
}

/// A [`Notifier`] recording every delivery attempt.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the pipeline attempted to deliver, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    /// When set, every delivery attempt is recorded and then fails.
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let kind = notification.kind();
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(notification);
        if self.failing.load(Ordering::SeqCst) {
            Err(NotifyError::Delivery {
                kind,
                reason: "scripted delivery failure".to_owned(),
            })
        } else {
            Ok(())
        }
    }
}

/// Wraps a [`JobStore`] and fails its capture bookkeeping on demand, for
/// exercising the transient-persistence-failure path.
#[derive(Clone)]
pub struct FlakyJobStore<S> {
    inner: S,
    failing: Arc<AtomicBool>,
}

impl<S> FlakyJobStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, `record_artifact` and `record_failure` fail as unavailable.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn outage(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("scripted store outage".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S> JobStore for FlakyJobStore<S>
where
    S: JobStore,
{
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        self.inner.create(new).await
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &JobId, patch: JobPatch) -> Result<Job, StoreError> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Job>, StoreError> {
        self.inner.list_by_owner(owner).await
    }

    async fn record_artifact(
        &self,
        id: &JobId,
        artifact: Artifact,
        retention: &RetentionPolicy,
    ) -> Result<(), StoreError> {
        self.outage()?;
        self.inner.record_artifact(id, artifact, retention).await
    }

    async fn record_failure(&self, id: &JobId, error: &str) -> Result<(), StoreError> {
        self.outage()?;
        self.inner.record_failure(id, error).await
    }

    async fn owner_address(&self, id: &JobId) -> Result<Option<Address>, StoreError> {
        self.inner.owner_address(id).await
    }
}
