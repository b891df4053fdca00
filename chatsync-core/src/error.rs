//! Error taxonomy shared by the state machine and the transports.
//!
//! Every failure is scoped to the operation that raised it. The session
//! decides what to do with it from its kind alone:
//!
//! | Kind | Handling |
//! |------|----------|
//! | transient (`Network`, `Timeout`, `Status`, `Decode`) | logged, state left stale |
//! | `Unauthorized` | logged, surfaced in the view, never retried |
//! | `ChannelClosed` | channel marked dropped, no reconnect |
//! | `EmptyMessage`, `SessionClosed` | returned to the caller |

/// Errors produced while synchronizing a room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The credential was rejected. Retrying with the same credential
    /// cannot succeed.
    #[error("authorization rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("push channel closed")]
    ChannelClosed,

    #[error("message body is empty")]
    EmptyMessage,

    #[error("room session is no longer active")]
    SessionClosed,
}

impl SyncError {
    /// Map an HTTP status to an error. 401 and 403 are authorization
    /// failures, everything else is a plain status error.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::Status { status },
        }
    }

    /// Whether this is an authorization failure.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Whether the same call could succeed later without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Status { .. } | Self::Decode(_) | Self::ChannelClosed
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
