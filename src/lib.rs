//! Recurring webpage screenshot scheduling.
//!
//! `snapcron` owns the temporal core of a screenshot-automation service: the
//! per-job timers, the capture pipeline each fire runs through, and the state
//! machine that pauses a job when its capture fails. Everything around it is
//! a seam:
//!
//! - [`store::JobStore`] persists job records and their artifact history,
//! - [`capture::CaptureEngine`] performs one headless-browser capture,
//! - [`notify::Notifier`] delivers owner and operator notifications.
//!
//! The [`Scheduler`] is the public surface an API layer talks to: tell it
//! when a job was created, edited, or deleted and it keeps the
//! [`trigger::TriggerTable`] in step. Each trigger fire runs the
//! [`pipeline::CapturePipeline`], which persists the outcome, sends at most
//! one notification, and reports whether the job's schedule survives.
//!
//! ```no_run
//! # use snapcron::prelude::*;
//! # use snapcron::{store::memory::InMemoryJobStore, testing::{RecordingNotifier, StubCaptureEngine}};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryJobStore::new();
//! let scheduler = Scheduler::new(
//!     TriggerTable::new(),
//!     store.clone(),
//!     StubCaptureEngine::new(),
//!     RecordingNotifier::new(),
//! );
//!
//! let job = store
//!     .create(NewJob {
//!         owner: "ana".into(),
//!         url: "http://example.com".to_owned(),
//!         title: "Example".to_owned(),
//!         cadence: "07:30".to_owned(),
//!     })
//!     .await?;
//! scheduler.on_job_created(&job)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod capture;
pub mod job;
pub mod notify;
pub mod pipeline;
pub mod prelude;
pub mod retention;
pub mod schedule;
pub mod store;
pub mod testing;
pub mod trigger;

use chrono::Utc;
use thiserror::Error;

use crate::{
    capture::CaptureEngine,
    job::{Job, JobId},
    notify::Notifier,
    pipeline::{CapturePipeline, FireOutcome},
    schedule::FireSpec,
    store::JobStore,
    trigger::{FireHook, TriggerError, TriggerTable},
};

/// Policy deciding which [`FireSpec`] backs a job's trigger.
///
/// The default honours the job's declared cadence via
/// [`FireSpec::from_cadence`]; installing
/// `|_| FireSpec::with_default_lead(Utc::now())` instead reproduces the
/// fixed-lead behaviour regardless of what the cadence says.
pub type FireSpecPolicy = Arc<dyn Fn(&Job) -> FireSpec + Send + Sync>;

/// Orchestrates job schedules.
///
/// The scheduler is the only component that mutates its [`TriggerTable`]: the
/// API layer reports job lifecycle events, and each trigger fire reports its
/// [`FireOutcome`] back so a terminal capture failure disables the schedule.
pub struct Scheduler<S, C, N> {
    table: Arc<TriggerTable>,
    pipeline: Arc<CapturePipeline<S, C, N>>,
    fire_policy: FireSpecPolicy,
}

impl<S, C, N> Scheduler<S, C, N>
where
    S: JobStore + 'static,
    C: CaptureEngine + 'static,
    N: Notifier + 'static,
{
    /// Creates a scheduler around a freshly injected trigger registry.
    pub fn new(table: TriggerTable, store: S, engine: C, notifier: N) -> Self {
        Self::with_pipeline(table, CapturePipeline::new(store, engine, notifier))
    }

    /// Creates a scheduler around a preconfigured pipeline, e.g. one carrying
    /// a retention policy.
    pub fn with_pipeline(table: TriggerTable, pipeline: CapturePipeline<S, C, N>) -> Self {
        Self {
            table: Arc::new(table),
            pipeline: Arc::new(pipeline),
            fire_policy: Arc::new(|job| FireSpec::from_cadence(&job.cadence, Utc::now())),
        }
    }

    /// Overrides how fire specs are derived from jobs.
    pub fn with_fire_policy(mut self, policy: FireSpecPolicy) -> Self {
        self.fire_policy = policy;
        self
    }

    /// Registers the trigger for a newly created job.
    pub fn on_job_created(&self, job: &Job) -> Result<(), SchedulerError> {
        let spec = (self.fire_policy)(job);
        self.table
            .register(job.id.clone(), spec, job.url.clone(), self.fire_hook())?;
        tracing::debug!(job_id = %job.id, "registered trigger for job {}", job.id);
        Ok(())
    }

    /// Recomputes the job's fire spec and replaces its trigger.
    ///
    /// This also re-arms a paused job: editing is the user's gesture to try
    /// again after a terminal capture failure. The job stays paused until its
    /// next successful fire flips it back to active.
    pub fn on_job_edited(&self, job: &Job) -> Result<(), SchedulerError> {
        let spec = (self.fire_policy)(job);
        self.table
            .replace(job.id.clone(), spec, job.url.clone(), self.fire_hook())?;
        tracing::debug!(job_id = %job.id, "replaced trigger for job {}", job.id);
        Ok(())
    }

    /// Drops the job's trigger. Safe to call any number of times, including
    /// for jobs that never had one.
    pub fn on_job_deleted(&self, job_id: &JobId) {
        self.table.remove(job_id);
    }

    pub fn has_trigger(&self, job_id: &JobId) -> bool {
        self.table.contains(job_id)
    }

    /// The ids of every registered trigger, for observability.
    pub fn active_triggers(&self) -> Vec<JobId> {
        self.table.list().collect()
    }

    /// Cancels every trigger and waits for in-flight fires to finish.
    pub async fn graceful_shutdown(self) -> Result<(), SchedulerError> {
        tracing::debug!("shutting down scheduler triggers");
        self.table.drain().await?;
        Ok(())
    }

    fn fire_hook(&self) -> FireHook {
        let pipeline = Arc::clone(&self.pipeline);
        let table = Arc::clone(&self.table);
        Arc::new(move |job_id, url| {
            let pipeline = Arc::clone(&pipeline);
            let table = Arc::clone(&table);
            Box::pin(async move {
                if let FireOutcome::TerminalFailure = pipeline.run(&job_id, &url).await {
                    tracing::info!(
                        %job_id,
                        "disabling trigger for job {job_id} after terminal capture failure"
                    );
                    table.remove(&job_id);
                }
            })
        })
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("error updating the trigger table")]
    Trigger(#[from] TriggerError),
}
