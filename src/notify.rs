//! The notification seam.
//!
//! The pipeline emits a closed set of notification variants, each carrying
//! exactly the data its handler needs. Rendering (mail templates, webhook
//! bodies) happens entirely behind [`Notifier`] implementations; [`kind`]
//! gives them a stable template key to dispatch on.
//!
//! [`kind`]: Notification::kind

use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A notification recipient address, typically an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the capture pipeline can ask a [`Notifier`] to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// A fresh artifact was captured and persisted for one of the owner's
    /// jobs.
    ArtifactReady { address: Address },
    /// A capture attempt failed and the job has been paused.
    InvalidUrl { address: Address, reason: String },
    /// A persistence problem needing operator attention; never addressed to a
    /// job owner.
    OperatorAlert { reason: String },
}

impl Notification {
    /// Stable template key for delivery implementations.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactReady { .. } => "artifact-ready",
            Self::InvalidUrl { .. } => "url-not-valid",
            Self::OperatorAlert { .. } => "operator-alert",
        }
    }

    /// The owner address this notification targets, if it targets one.
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::ArtifactReady { address } | Self::InvalidUrl { address, .. } => Some(address),
            Self::OperatorAlert { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to deliver {kind} notification: {reason}")]
    Delivery { kind: &'static str, reason: String },
}

/// Sends notifications.
///
/// Delivery is best-effort from the pipeline's point of view: failures are
/// reported to the caller, logged, and never alter job state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let address = Address::from("ana@example.com");
        assert_eq!(
            Notification::ArtifactReady {
                address: address.clone()
            }
            .kind(),
            "artifact-ready"
        );
        assert_eq!(
            Notification::InvalidUrl {
                address,
                reason: "DNS error".to_owned()
            }
            .kind(),
            "url-not-valid"
        );
        assert_eq!(
            Notification::OperatorAlert {
                reason: "store down".to_owned()
            }
            .kind(),
            "operator-alert"
        );
    }

    #[test]
    fn operator_alerts_have_no_owner_address() {
        let notification = Notification::OperatorAlert {
            reason: "store down".to_owned(),
        };
        assert!(notification.address().is_none());
    }
}
