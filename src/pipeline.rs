//! The capture pipeline: one trigger fire turned into a durable state
//! transition plus at most one notification.
//!
//! Capture and persistence failures are fully handled here; the only signal
//! that leaves the pipeline is the [`FireOutcome`], which tells the scheduler
//! whether the job's trigger may keep firing.

use chrono::Utc;
use tracing::instrument;

use crate::{
    capture::{CaptureEngine, CaptureFailed},
    job::{Artifact, ArtifactRef, JobId},
    notify::{Address, Notification, Notifier},
    retention::RetentionPolicy,
    store::{JobStore, StoreError},
};

/// What one fire means for the job's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The fire ran to completion; the trigger stays installed.
    Completed,
    /// The capture failed definitively; the job's trigger must be removed
    /// until the job is edited again.
    TerminalFailure,
}

/// Executes one capture attempt for one job and interprets the outcome.
pub struct CapturePipeline<S, C, N> {
    store: S,
    engine: C,
    notifier: N,
    retention: RetentionPolicy,
}

impl<S, C, N> CapturePipeline<S, C, N>
where
    S: JobStore,
    C: CaptureEngine,
    N: Notifier,
{
    pub fn new(store: S, engine: C, notifier: N) -> Self {
        Self {
            store,
            engine,
            notifier,
            retention: RetentionPolicy::default(),
        }
    }

    /// Bounds the artifact history kept per job.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Runs one fire for the job.
    ///
    /// The url is the one captured when the trigger was registered; after an
    /// edit race it may be one edit stale, which is tolerated.
    #[instrument(skip(self))]
    pub async fn run(&self, job_id: &JobId, url: &str) -> FireOutcome {
        let captured = self.engine.capture(url, job_id).await;

        let address = match self.store.owner_address(job_id).await {
            Ok(address) => address,
            Err(err) => {
                // owner resolution is best-effort; capture bookkeeping
                // proceeds without a notification target
                tracing::warn!(?err, %job_id, "could not resolve owner address for job {job_id}");
                None
            }
        };

        match captured {
            Ok(location) => self.handle_capture_success(job_id, location, address).await,
            Err(failure) => self.handle_capture_failure(job_id, failure, address).await,
        }
    }

    async fn handle_capture_success(
        &self,
        job_id: &JobId,
        location: ArtifactRef,
        address: Option<Address>,
    ) -> FireOutcome {
        let artifact = Artifact {
            location,
            captured_at: Utc::now(),
        };
        match self
            .store
            .record_artifact(job_id, artifact, &self.retention)
            .await
        {
            Ok(()) => {
                tracing::debug!(%job_id, "artifact recorded for job {job_id}");
                if let Some(address) = address {
                    self.send(Notification::ArtifactReady { address }).await;
                }
            }
            Err(StoreError::JobNotFound(_)) => {
                tracing::debug!(%job_id, "job {job_id} was removed while its capture was in flight");
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "failed to persist artifact for job {job_id}");
                self.send(Notification::OperatorAlert {
                    reason: format!("failed to persist artifact for job {job_id}: {err}"),
                })
                .await;
            }
        }
        FireOutcome::Completed
    }

    async fn handle_capture_failure(
        &self,
        job_id: &JobId,
        failure: CaptureFailed,
        address: Option<Address>,
    ) -> FireOutcome {
        let reason = failure.reason().to_owned();
        tracing::warn!(%job_id, %reason, "capture failed for job {job_id}: {reason}");

        match self.store.record_failure(job_id, &reason).await {
            Ok(()) => {}
            Err(StoreError::JobNotFound(_)) => {
                tracing::debug!(%job_id, "job {job_id} was removed while its capture was in flight");
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "failed to record capture failure for job {job_id}");
            }
        }
        if let Some(address) = address {
            self.send(Notification::InvalidUrl { address, reason }).await;
        }
        FireOutcome::TerminalFailure
    }

    async fn send(&self, notification: Notification) {
        let kind = notification.kind();
        let _ = self
            .notifier
            .send(notification)
            .await
            .inspect_err(|err| tracing::warn!(?err, kind, "failed to deliver {kind} notification"));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        job::{JobStatus, NewJob},
        store::memory::InMemoryJobStore,
        testing::{FlakyJobStore, RecordingNotifier, StubCaptureEngine},
    };
    use assert_matches::assert_matches;

    async fn seeded_store() -> (InMemoryJobStore, JobId) {
        let store = InMemoryJobStore::new();
        store
            .insert_owner("ana".into(), "ana@example.com".into())
            .unwrap();
        let job = store
            .create(NewJob {
                owner: "ana".into(),
                url: "http://good.example".to_owned(),
                title: "Good".to_owned(),
                cadence: "daily".to_owned(),
            })
            .await
            .unwrap();
        (store, job.id)
    }

    #[tokio::test]
    async fn success_records_an_artifact_and_notifies_the_owner() {
        let (store, job_id) = seeded_store().await;
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        engine.succeed(&job_id, "screenshots/1/a1.png");
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier.clone());

        let outcome = pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::Completed);
        let stored = store.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Active);
        assert_eq!(stored.error, "");
        assert_eq!(
            stored.latest_artifact().map(|a| a.location.as_str()),
            Some("screenshots/1/a1.png")
        );
        assert_matches!(
            notifier.sent().as_slice(),
            [Notification::ArtifactReady { address }] if address == &"ana@example.com".into()
        );
    }

    #[tokio::test]
    async fn success_without_a_resolvable_owner_skips_the_notification() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(NewJob {
                owner: "ghost".into(),
                url: "http://good.example".to_owned(),
                title: "Good".to_owned(),
                cadence: "daily".to_owned(),
            })
            .await
            .unwrap();
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier.clone());

        let outcome = pipeline.run(&job.id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::Completed);
        assert_eq!(store.get(&job.id).await.unwrap().artifacts.len(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_alerts_the_operator_and_keeps_the_schedule() {
        let (store, job_id) = seeded_store().await;
        let flaky = FlakyJobStore::new(store.clone());
        flaky.fail_writes(true);
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(flaky, engine, notifier.clone());

        let outcome = pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::Completed);
        let stored = store.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Active);
        assert!(stored.artifacts.is_empty());
        assert_matches!(
            notifier.sent().as_slice(),
            [Notification::OperatorAlert { .. }]
        );
    }

    #[tokio::test]
    async fn capture_failure_pauses_the_job_and_is_terminal() {
        let (store, job_id) = seeded_store().await;
        let engine = StubCaptureEngine::new();
        engine.fail(&job_id, "DNS error");
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier.clone());

        let outcome = pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::TerminalFailure);
        let stored = store.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Paused);
        assert_eq!(stored.error, "DNS error");
        assert!(stored.artifacts.is_empty());
        assert_matches!(
            notifier.sent().as_slice(),
            [Notification::InvalidUrl { reason, .. }] if reason == "DNS error"
        );
    }

    #[tokio::test]
    async fn capture_failure_without_a_reason_uses_the_default() {
        let (store, job_id) = seeded_store().await;
        let engine = StubCaptureEngine::new();
        engine.fail(&job_id, "");
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier);

        pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(
            store.get(&job_id).await.unwrap().error,
            CaptureFailed::DEFAULT_REASON
        );
    }

    #[tokio::test]
    async fn notifier_failures_never_alter_job_state() {
        let (store, job_id) = seeded_store().await;
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        notifier.fail_all(true);
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier.clone());

        let outcome = pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::Completed);
        let stored = store.get(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Active);
        assert_eq!(stored.artifacts.len(), 1);
        // the delivery was attempted and failed, nothing more
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn a_job_deleted_mid_flight_is_tolerated() {
        let (store, job_id) = seeded_store().await;
        store.delete(&job_id).await.unwrap();
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(store, engine, notifier.clone());

        let outcome = pipeline.run(&job_id, "http://good.example").await;

        assert_eq!(outcome, FireOutcome::Completed);
        // neither the owner nor the operator hears about the race
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn retention_bounds_the_history_across_fires() {
        let (store, job_id) = seeded_store().await;
        let engine = StubCaptureEngine::new();
        let notifier = RecordingNotifier::new();
        let pipeline = CapturePipeline::new(store.clone(), engine, notifier)
            .with_retention(RetentionPolicy::MaxCount(2));

        for _ in 0..4 {
            pipeline.run(&job_id, "http://good.example").await;
        }

        assert_eq!(store.get(&job_id).await.unwrap().artifacts.len(), 2);
    }
}
