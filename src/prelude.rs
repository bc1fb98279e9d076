//! Convenient import of the crate's main types.

pub use crate::{
    capture::{CaptureEngine, CaptureFailed},
    job::{Artifact, ArtifactRef, Job, JobId, JobPatch, JobStatus, NewJob, OwnerId},
    notify::{Address, Notification, Notifier, NotifyError},
    pipeline::{CapturePipeline, FireOutcome},
    retention::RetentionPolicy,
    schedule::FireSpec,
    store::{JobStore, StoreError},
    trigger::{TriggerError, TriggerTable},
    Scheduler, SchedulerError,
};
