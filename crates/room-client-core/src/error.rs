//! Error types for the live-room client coordination layer
//!
//! Every fallible operation in this crate returns [`RoomResult`]. The error
//! taxonomy separates transport failures (retryable at the caller's
//! discretion), authoritative backend rejections (never retried), engine
//! failures (which roll local room state back), and local precondition or
//! state violations (surfaced to the invoking layer without side effects).
//! Stale events are an internal outcome of reconciliation; they are logged
//! and dropped, never propagated to callers.
//!
//! No error here is fatal to the process. Everything is recoverable at the
//! room-session granularity by leaving and rejoining.

use thiserror::Error;

/// Result type for room client operations
pub type RoomResult<T> = Result<T, RoomError>;

/// Errors that can occur in the room client
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    /// Network or socket failure while talking to the signaling service.
    ///
    /// Callers may retry read-only queries at their discretion; the manager
    /// never retries a state-mutating request on its own.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backend acknowledged the request with a non-zero result code.
    ///
    /// Authoritative and final for this request. Not retried.
    #[error("backend rejected request (code {code}): {message}")]
    BackendRejected { code: i32, message: String },

    /// The requested room does not exist or is no longer live
    #[error("room not found: {room_id}")]
    RoomNotFound { room_id: String },

    /// The RTC engine failed an operation (join, publish, forward stream)
    #[error("engine operation failed: {message}")]
    Engine { message: String },

    /// A local precondition was violated (occupied seat, locked seat,
    /// unknown user). The operation was not sent and no state changed.
    #[error("precondition violated: {reason}")]
    Precondition { reason: String },

    /// The operation is not valid in the current session phase or role
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A notification arrived after the local state it describes was already
    /// superseded. Internal outcome; reconciliation logs and drops it.
    #[error("stale event ignored: {message}")]
    Stale { message: String },

    /// An operation did not complete within its configured window
    #[error("operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RoomError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a backend rejection from an ack result code
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::BackendRejected {
            code,
            message: message.into(),
        }
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Create a precondition violation
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a stale event marker
    pub fn stale(message: impl Into<String>) -> Self {
        Self::Stale {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry by the caller could plausibly succeed.
    ///
    /// Only transport failures qualify. Backend rejections are authoritative
    /// and local validation failures will fail identically on retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
