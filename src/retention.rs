//! Retention policies bounding a job's artifact history.
//!
//! A policy is applied each time a new artifact is recorded, so a history can
//! never exceed its bound by more than the artifact being added.

use chrono::{DateTime, TimeDelta, Utc};

use crate::job::Artifact;

/// How much of a job's artifact history to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep every artifact ever captured.
    KeepAll,
    /// Keep at most the given number of artifacts, newest first.
    MaxCount(usize),
    /// Drop artifacts captured longer ago than the given age.
    MaxAge(TimeDelta),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::KeepAll
    }
}

impl RetentionPolicy {
    /// Applies the policy to a newest-first artifact history.
    pub fn apply(&self, artifacts: &mut Vec<Artifact>, now: DateTime<Utc>) {
        match self {
            Self::KeepAll => {}
            Self::MaxCount(limit) => artifacts.truncate(*limit),
            Self::MaxAge(age) => {
                let cutoff = now - *age;
                artifacts.retain(|artifact| artifact.captured_at > cutoff);
            }
        }
    }
}
