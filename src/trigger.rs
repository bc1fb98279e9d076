//! The trigger table: one cancellable recurring timer per scheduled job.
//!
//! Each registered trigger is a spawned task looping over "sleep until the
//! next occurrence, then run the fire hook". The hook is awaited inline, so
//! occurrences of the same job are serialised: a fire that outlives its
//! interval causes the overlapped occurrences to be skipped, never queued.
//! Triggers for distinct jobs are independent tasks and fire concurrently.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use futures::future::join_all;
use fxhash::FxHashMap;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{job::JobId, schedule::FireSpec};

/// Callback invoked once per trigger occurrence, with the job id and the url
/// captured at registration time.
pub type FireHook =
    Arc<dyn Fn(JobId, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

enum Message {
    Terminate,
}

#[derive(Debug)]
struct TriggerHandle {
    sender: mpsc::UnboundedSender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl TriggerHandle {
    fn cancel(&self) {
        // the task may already have exited; nothing to do then
        let _ = self.sender.send(Message::Terminate);
    }

    async fn shutdown(mut self) -> Result<(), TriggerError> {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.map_err(|_| TriggerError::ShutdownFailed)?;
        }
        Ok(())
    }
}

/// Registry of live timers, keyed by job id.
///
/// The scheduler is the only component expected to mutate it. Mutations for
/// the same job id are serialised by the registry lock; mutations for
/// distinct jobs do not contend beyond that lock's short critical section.
#[derive(Default)]
pub struct TriggerTable {
    entries: Mutex<FxHashMap<JobId, TriggerHandle>>,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("a trigger is already registered for job {0}")]
    DuplicateTrigger(JobId),
    #[error("failed to shut down trigger tasks")]
    ShutdownFailed,
    #[error("trigger registry lock poisoned")]
    Poisoned,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a recurring timer for the job.
    ///
    /// Fails with [`TriggerError::DuplicateTrigger`] when one already exists;
    /// callers wanting in-place renewal use [`TriggerTable::replace`].
    pub fn register(
        &self,
        job: JobId,
        spec: FireSpec,
        url: String,
        hook: FireHook,
    ) -> Result<(), TriggerError> {
        let mut entries = self.entries.lock().map_err(|_| TriggerError::Poisoned)?;
        if entries.contains_key(&job) {
            return Err(TriggerError::DuplicateTrigger(job));
        }
        let handle = Self::spawn_trigger(job.clone(), spec, url, hook);
        entries.insert(job, handle);
        Ok(())
    }

    /// Atomically cancels any existing timer for the job and installs a new
    /// one.
    ///
    /// At most one in-flight fire from the old timer may still complete after
    /// this returns; it runs with the url it was registered with.
    pub fn replace(
        &self,
        job: JobId,
        spec: FireSpec,
        url: String,
        hook: FireHook,
    ) -> Result<(), TriggerError> {
        let mut entries = self.entries.lock().map_err(|_| TriggerError::Poisoned)?;
        if let Some(old) = entries.remove(&job) {
            old.cancel();
        }
        let handle = Self::spawn_trigger(job.clone(), spec, url, hook);
        entries.insert(job, handle);
        Ok(())
    }

    /// Cancels and forgets the job's timer. Removing an absent trigger is a
    /// no-op, and removal is safe from inside the job's own fire hook.
    pub fn remove(&self, job: &JobId) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(handle) = entries.remove(job) {
                handle.cancel();
            }
        }
    }

    pub fn contains(&self, job: &JobId) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(job))
            .unwrap_or(false)
    }

    /// Snapshot of the registered trigger ids, for observability.
    pub fn list(&self) -> impl Iterator<Item = JobId> {
        let mut ids: Vec<JobId> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids.into_iter()
    }

    /// Terminates every timer and waits for the tasks to finish. A fire that
    /// is still executing runs to completion first.
    pub async fn drain(&self) -> Result<(), TriggerError> {
        let handles: Vec<TriggerHandle> = {
            let mut entries = self.entries.lock().map_err(|_| TriggerError::Poisoned)?;
            entries.drain().map(|(_, handle)| handle).collect()
        };
        join_all(handles.into_iter().map(TriggerHandle::shutdown))
            .await
            .into_iter()
            .collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }

    fn spawn_trigger(job: JobId, spec: FireSpec, url: String, hook: FireHook) -> TriggerHandle {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut after = Utc::now();
            loop {
                let next = spec.next_after(after);
                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {
                        hook(job.clone(), url.clone()).await;
                        // recomputing from max(now, next) both skips the
                        // occurrences a slow fire overlapped and keeps an
                        // early timer wake from double-firing one occurrence
                        after = Utc::now().max(next);
                    }
                }
            }
            tracing::debug!(%job, "trigger for job {job} stopped");
        });

        TriggerHandle {
            sender,
            handle: Some(handle),
        }
    }
}
