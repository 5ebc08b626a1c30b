use chrono::Local;

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    config::{Config, SenderConfig, Timeouts},
    message,
    models::{Submission, ValidationError},
    transport::{FailureKind, MessageId, Transport, TransportError},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("sender account (SMTP_USER) is not configured")]
    MissingSender,

    #[error("sender credential (SMTP_PASS) is not configured")]
    MissingCredential,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay is not configured: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("invalid submission: {0}")]
    Validation(#[from] ValidationError),
}

/// Result of the single delivery attempt made for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { message_id: MessageId },
    Failed { kind: FailureKind, detail: String },
}

impl DeliveryOutcome {
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub const fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Delivered { message_id } => Some(message_id),
            Self::Failed { .. } => None,
        }
    }

    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Delivered { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

impl From<TransportError> for DeliveryOutcome {
    fn from(e: TransportError) -> Self {
        Self::Failed {
            kind: e.kind,
            detail: e.detail,
        }
    }
}

/// Turns contact form submissions into emails for the site owner.
pub struct Relay {
    sender: SenderConfig,
    site_name: String,
    timeouts: Timeouts,
    verify_connection: bool,
    transport: Arc<dyn Transport>,
}

impl Relay {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            sender: config.sender.clone(),
            site_name: config.site_name.clone(),
            timeouts: config.smtp.timeouts(config.mode),
            verify_connection: config.smtp.verify_connection,
            transport,
        }
    }

    pub async fn relay(&self, submission: Submission) -> Result<DeliveryOutcome, RelayError> {
        let sender = self.sender_address()?;
        let submission = submission.validate()?;

        let email = message::compose(&submission, sender, &self.site_name, Local::now());

        tracing::info!(
            "Relaying contact message from '{}' <{}>",
            submission.name,
            submission.email
        );

        if self.verify_connection {
            let verified = bounded(
                self.timeouts.verify_bound(),
                "connection check",
                self.transport.verify_connection(),
            )
            .await;
            if let Err(e) = verified {
                tracing::error!("SMTP connection check failed ({}): {}", e.kind, e.detail);
                return Ok(e.into());
            }
        }

        let outcome = match bounded(
            self.timeouts.send_bound(),
            "send",
            self.transport.send(email),
        )
        .await
        {
            Ok(message_id) => {
                tracing::info!("Contact message sent: {}", message_id);
                DeliveryOutcome::Delivered { message_id }
            }
            Err(e) => {
                tracing::error!("Failed to send contact message ({}): {}", e.kind, e.detail);
                e.into()
            }
        };

        Ok(outcome)
    }

    fn sender_address(&self) -> Result<&str, ConfigurationError> {
        match self.sender.credentials() {
            Some((user, _)) => Ok(user),
            None if self.sender.user.as_deref().is_none_or(|u| u.trim().is_empty()) => {
                Err(ConfigurationError::MissingSender)
            }
            None => Err(ConfigurationError::MissingCredential),
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    phase: &str,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(TransportError::new(
            FailureKind::TimedOut,
            format!("{phase} did not complete within {}s", limit.as_secs()),
        ))
    })
}
