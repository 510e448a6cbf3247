//! Categorical error model shared by every public runtime operation.
//!
//! Errors carry a [`ErrorKind`] tag so callers can branch on category rather
//! than string-matching messages. Kinds group into three classes:
//! transient (safe to retry within a budget), permanent (retrying the same
//! call cannot help), and fatal (the hosting component must stop).

// Layer 1: Standard library imports
use std::fmt;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Coarse retryability class of an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on retry (possibly after a membership refresh).
    Transient,
    /// Retrying the identical call cannot succeed.
    Permanent,
    /// The hosting component is in an unrecoverable state.
    Fatal,
}

/// Categorical kind attached to every runtime error.
///
/// The discriminants double as wire status codes (0 is reserved for success).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    /// The contacted silo is not the ring owner of the target key.
    NotOwner = 1,
    /// The target silo could not be reached.
    Unreachable = 2,
    /// The caller-supplied deadline elapsed.
    Timeout = 3,
    /// The local placement snapshot is stale; refresh and retry.
    RingRefresh = 4,
    /// A rate limit rejected the operation.
    Throttled = 5,
    /// No such actor type, activation, or record.
    NotFound = 6,
    /// Argument or state bytes could not be encoded/decoded.
    Marshalling = 7,
    /// The actor type does not expose the named method.
    UnsupportedMethod = 8,
    /// A non-re-entrant actor appeared twice in one call chain.
    Reentrancy = 9,
    /// A versioned save lost an optimistic-concurrency race.
    ConcurrencyConflict = 10,
    /// Supervision terminated the activation.
    SupervisionTerminated = 11,
    /// The operation was cancelled before completion.
    Cancelled = 12,
    /// The peer silo is shutting down.
    PeerShutdown = 13,
    /// The remote handler returned an application error.
    RemoteException = 14,
    /// The backing store returned data the runtime cannot interpret.
    StoreCorrupted = 15,
    /// The peer speaks an incompatible codec/schema version.
    CodecMismatch = 16,
}

impl ErrorKind {
    /// Retryability class of this kind.
    pub fn class(self) -> ErrorClass {
        match self {
            Self::NotOwner
            | Self::Unreachable
            | Self::Timeout
            | Self::RingRefresh
            | Self::Throttled
            | Self::PeerShutdown => ErrorClass::Transient,
            Self::NotFound
            | Self::Marshalling
            | Self::UnsupportedMethod
            | Self::Reentrancy
            | Self::ConcurrencyConflict
            | Self::SupervisionTerminated
            | Self::Cancelled
            | Self::RemoteException => ErrorClass::Permanent,
            Self::StoreCorrupted | Self::CodecMismatch => ErrorClass::Fatal,
        }
    }

    /// Check if the kind is safe to retry within a bounded budget.
    pub fn is_transient(self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Check if the kind indicates an unrecoverable component.
    pub fn is_fatal(self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Wire status byte for this kind (0 is success, never a kind).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire status byte back into a kind.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::NotOwner,
            2 => Self::Unreachable,
            3 => Self::Timeout,
            4 => Self::RingRefresh,
            5 => Self::Throttled,
            6 => Self::NotFound,
            7 => Self::Marshalling,
            8 => Self::UnsupportedMethod,
            9 => Self::Reentrancy,
            10 => Self::ConcurrencyConflict,
            11 => Self::SupervisionTerminated,
            12 => Self::Cancelled,
            13 => Self::PeerShutdown,
            14 => Self::RemoteException,
            15 => Self::StoreCorrupted,
            16 => Self::CodecMismatch,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotOwner => "not-owner",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::RingRefresh => "ring-refresh-needed",
            Self::Throttled => "throttled",
            Self::NotFound => "not-found",
            Self::Marshalling => "marshalling-failed",
            Self::UnsupportedMethod => "unsupported-method",
            Self::Reentrancy => "reentrancy",
            Self::ConcurrencyConflict => "concurrency-conflict",
            Self::SupervisionTerminated => "supervision-terminated",
            Self::Cancelled => "cancelled",
            Self::PeerShutdown => "peer-shutdown",
            Self::RemoteException => "remote-exception",
            Self::StoreCorrupted => "store-corrupted",
            Self::CodecMismatch => "codec-mismatch",
        };
        write!(f, "{name}")
    }
}

/// Tagged error returned by every public runtime operation.
///
/// Carries the categorical [`ErrorKind`], a human-readable message, an
/// optional inner cause and an optional retry-after hint.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct InvokeError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    retry_after: Option<Duration>,
}

impl InvokeError {
    /// Create an error with a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retry_after: None,
        }
    }

    /// Attach an inner cause.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a retry-after hint (meaningful for transient kinds).
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// The categorical kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Suggested minimum delay before a retry, if the peer provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Shorthand for `self.kind().is_transient()`.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Shorthand for a deadline-expired error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for a wrong-owner error naming the observed owner.
    pub fn not_owner(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotOwner, message)
    }

    /// Shorthand for a missing actor type, activation, or record.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for encode/decode failures.
    pub fn marshalling(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Marshalling, message)
    }

    /// Shorthand for a cancelled operation.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}
