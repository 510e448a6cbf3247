// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::error::{ErrorKind, InvokeError};

/// Error returned by actor handlers.
///
/// Application failures become `remote-exception` on the caller's side;
/// runtime errors that passed through the handler (state conflicts, downstream
/// call failures) keep their original kind.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Application-level failure raised by actor code.
    #[error("{0}")]
    App(String),

    /// A runtime error propagated out of the handler with `?`.
    #[error(transparent)]
    Runtime(#[from] InvokeError),
}

impl ActorError {
    /// Create an application-level failure.
    pub fn app(message: impl Into<String>) -> Self {
        Self::App(message.into())
    }

    /// Convert into the tagged error sent back to the caller.
    pub fn into_invoke_error(self) -> InvokeError {
        match self {
            Self::App(message) => InvokeError::new(ErrorKind::RemoteException, message),
            Self::Runtime(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_maps_to_remote_exception() {
        let err = ActorError::app("insufficient funds").into_invoke_error();
        assert_eq!(err.kind(), ErrorKind::RemoteException);
        assert!(err.message().contains("insufficient funds"));
    }

    #[test]
    fn test_runtime_error_keeps_kind() {
        let inner = InvokeError::new(ErrorKind::ConcurrencyConflict, "version raced");
        let err: ActorError = inner.into();
        assert_eq!(
            err.into_invoke_error().kind(),
            ErrorKind::ConcurrencyConflict
        );
    }
}
