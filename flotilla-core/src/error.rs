//! Error types for reconciliation.

use thiserror::Error;

use crate::reconciler::Action;

/// Errors surfaced by a remote client adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Resource is absent. Not a failure on describe or delete.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create collided with an existing resource of the same name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Rate limited or temporarily unavailable.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Concurrent modification on the remote side.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed request, validation or permission failure.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl RemoteError {
    /// Whether the call may succeed if issued again after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Throttled(_) | RemoteError::Conflict(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::NotFound(_) => ErrorKind::NotFound,
            RemoteError::AlreadyExists(_) | RemoteError::Conflict(_) => ErrorKind::Conflict,
            RemoteError::Throttled(_) => ErrorKind::Throttled,
            RemoteError::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

/// Coarse error classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Throttled,
    Conflict,
    Fatal,
    Timeout,
    FatalConfig,
}

/// Errors reported in a reconciliation result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Descriptor is invalid. Raised before any remote call is issued.
    #[error("invalid descriptor: {0}")]
    FatalConfig(String),

    /// A remote call failed, after retries where the error was transient.
    #[error("{action} failed after {attempts} attempt(s): {source}")]
    Remote {
        action: Action,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    /// Deadline exceeded. The remote side may or may not have applied the call.
    #[error("deadline exceeded during {action}")]
    Timeout { action: Action },

    /// Remote state contradicts the declared identity or lifecycle.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The reconcile pass itself broke (a panicked or aborted task).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::FatalConfig(_) => ErrorKind::FatalConfig,
            ReconcileError::Remote { source, .. } => source.kind(),
            ReconcileError::Timeout { .. } => ErrorKind::Timeout,
            ReconcileError::Conflict(_) => ErrorKind::Conflict,
            ReconcileError::Internal(_) => ErrorKind::Fatal,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        ReconcileError::FatalConfig(message.into())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::Throttled("slow down".into()).is_retryable());
        assert!(RemoteError::Conflict("busy".into()).is_retryable());
        assert!(!RemoteError::Fatal("denied".into()).is_retryable());
        assert!(!RemoteError::AlreadyExists("web".into()).is_retryable());
        assert!(!RemoteError::NotFound("web".into()).is_retryable());
    }

    #[test]
    fn test_kind_follows_remote_source() {
        let err = ReconcileError::Remote {
            action: Action::Create,
            attempts: 5,
            source: RemoteError::Throttled("rate exceeded".into()),
        };
        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert_eq!(
            err.to_string(),
            "create failed after 5 attempt(s): throttled: rate exceeded"
        );
    }

    #[test]
    fn test_internal_error_is_fatal_not_conflict() {
        let err = ReconcileError::Internal("reconcile task aborted".into());
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.to_string(), "internal error: reconcile task aborted");
    }
}
