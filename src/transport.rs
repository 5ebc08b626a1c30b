use async_trait::async_trait;

use std::fmt;

use crate::message::OutboundMessage;

/// Classification of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthenticated,
    ConnectionFailed,
    TimedOut,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::ConnectionFailed => "connection failed",
            Self::TimedOut => "timed out",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Identifier the provider associates with an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Outbound mail capability used by the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Checks that the remote server is reachable and accepts our credentials.
    async fn verify_connection(&self) -> Result<(), TransportError>;

    async fn send(&self, message: OutboundMessage) -> Result<MessageId, TransportError>;
}
