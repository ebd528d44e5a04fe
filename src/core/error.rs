//! Error types and wire status mapping.
//!
//! Client-visible rejections (unknown tablet, conditional-operation
//! failures, retry backpressure) are ordinary error variants carrying the
//! version the condition was evaluated against, so callers always get the
//! observed version for observability. Replay-facing failures are separate
//! variants surfaced to the recovery orchestrator only.

use thiserror::Error;

/// Error conditions returned by the object manager.
#[derive(Debug, Error)]
pub enum StrataError {
    /// The key's tablet is not owned by this master in the NORMAL state.
    #[error("tablet not owned in the NORMAL state")]
    UnknownTablet,

    /// The object does not exist (read miss, or a doesnt-exist reject rule
    /// fired against a missing object).
    #[error("object does not exist")]
    ObjectDoesntExist,

    /// An exists reject rule fired against a live object.
    #[error("object already exists at version {current_version}")]
    ObjectExists { current_version: u64 },

    /// A version reject rule fired.
    #[error("version precondition failed, current version {current_version}")]
    WrongVersion { current_version: u64 },

    /// The log could not accept the append. The client should back off and
    /// retry; the cleaner may reclaim space in the meantime.
    #[error("log out of space, retry later")]
    Retry,

    /// A side-log append failed during replay. The orchestrator must abort
    /// the side log and re-drive recovery.
    #[error("replay aborted: side log append failed after {entries_applied} entries")]
    ReplayAborted { entries_applied: u64 },

    /// A recovery segment entry failed its integrity check and the
    /// configured policy is to abort rather than warn.
    #[error("corrupt entry in recovery segment: {reason}")]
    CorruptEntry { reason: &'static str },
}

/// Result type using StrataError.
pub type StrataResult<T> = Result<T, StrataError>;

/// Wire-level status codes, as serialized in client responses.
///
/// Successful operations are `Ok`; error variants map one-to-one onto the
/// remaining codes via [`StrataError::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    UnknownTablet = 1,
    ObjectDoesntExist = 2,
    ObjectExists = 3,
    WrongVersion = 4,
    Retry = 5,
}

impl StrataError {
    /// Map this error to its wire status code.
    ///
    /// Replay-facing variants are never sent to clients; they map to
    /// `Retry` so a misrouted caller still gets a sane code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownTablet => StatusCode::UnknownTablet,
            Self::ObjectDoesntExist => StatusCode::ObjectDoesntExist,
            Self::ObjectExists { .. } => StatusCode::ObjectExists,
            Self::WrongVersion { .. } => StatusCode::WrongVersion,
            Self::Retry => StatusCode::Retry,
            Self::ReplayAborted { .. } | Self::CorruptEntry { .. } => StatusCode::Retry,
        }
    }

    /// The version the failed condition was evaluated against, when the
    /// variant carries one.
    pub fn current_version(&self) -> Option<u64> {
        match self {
            Self::ObjectExists { current_version } | Self::WrongVersion { current_version } => {
                Some(*current_version)
            }
            _ => None,
        }
    }

    /// Check if this error indicates the operation should be retried
    /// after backoff rather than reported to the application.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StrataError::UnknownTablet.status(), StatusCode::UnknownTablet);
        assert_eq!(
            StrataError::WrongVersion { current_version: 3 }.status(),
            StatusCode::WrongVersion
        );
        assert_eq!(StrataError::Retry.status(), StatusCode::Retry);
        assert_eq!(
            StrataError::ReplayAborted { entries_applied: 0 }.status(),
            StatusCode::Retry
        );
    }

    #[test]
    fn test_current_version_observability() {
        assert_eq!(
            StrataError::ObjectExists { current_version: 7 }.current_version(),
            Some(7)
        );
        assert_eq!(StrataError::ObjectDoesntExist.current_version(), None);
    }

    #[test]
    fn test_retriability() {
        assert!(StrataError::Retry.is_retriable());
        assert!(!StrataError::UnknownTablet.is_retriable());
    }
}
