//! Error taxonomy shared by the directory backends, the listing pipeline and
//! the single-item operations.

use thiserror::Error;

/// Every failure a command can surface.
///
/// No variant is retried anywhere in the crate: any error is terminal for the
/// command that produced it.
#[derive(Debug, Error)]
pub enum SsmError {
    /// The named parameter does not exist.
    #[error("parameter '{key}' not found")]
    NotFound { key: String },

    /// The caller's credentials may not read or write the named parameter.
    #[error("access denied for '{key}': {message}")]
    AccessDenied { key: String, message: String },

    /// Credentials, connectivity, throttling, malformed continuation tokens and
    /// anything else the remote store reports.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The request itself is inconsistent and was never sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// One or more fan-out fetches failed during a listing. `keys` names every
    /// parameter whose fetch failed before the remaining fetches were aborted.
    #[error("failed to fetch {}", .keys.join(", "))]
    FetchFailed {
        keys: Vec<String>,
        #[source]
        source: Box<SsmError>,
    },

    /// The operation was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,

    /// A worker task panicked.
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl SsmError {
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        SsmError::Transport {
            operation,
            message: message.into(),
        }
    }

    /// The process exit status a command should end with for this error.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            SsmError::NotFound { .. } => ExitStatus::NotFound,
            SsmError::AccessDenied { .. } => ExitStatus::AccessDenied,
            SsmError::Transport { .. } => ExitStatus::Transport,
            SsmError::Validation(_) => ExitStatus::Validation,
            SsmError::FetchFailed { source, .. } => source.exit_status(),
            SsmError::Cancelled => ExitStatus::Interrupted,
            SsmError::Worker(_) => ExitStatus::GeneralError,
        }
    }
}

/// Structured exit codes so scripts can tell failure modes apart.
///
/// Code 2 is left to clap, which exits with it on usage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    GeneralError = 1,
    /// Profile, credentials, network or any other remote failure.
    Transport = 3,
    NotFound = 4,
    Validation = 5,
    /// Credentials lack permission for the key.
    AccessDenied = 6,
    /// 128 + SIGINT.
    Interrupted = 130,
}

impl ExitStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Finds the most specific exit status in an error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<SsmError>())
            .map(SsmError::exit_status)
            .unwrap_or(ExitStatus::GeneralError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_fetch_failed_names_every_key() {
        let err = SsmError::FetchFailed {
            keys: vec!["/app/a".to_string(), "/app/b".to_string()],
            source: Box::new(SsmError::NotFound {
                key: "/app/a".to_string(),
            }),
        };
        assert_eq!(err.to_string(), "failed to fetch /app/a, /app/b");
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            "failed to fetch /app/a, /app/b: parameter '/app/a' not found"
        );
    }

    #[test]
    fn test_fetch_failed_exit_status_follows_cause() {
        let err = SsmError::FetchFailed {
            keys: vec!["/app/a".to_string()],
            source: Box::new(SsmError::NotFound {
                key: "/app/a".to_string(),
            }),
        };
        assert_eq!(err.exit_status(), ExitStatus::NotFound);
    }

    #[test]
    fn test_exit_status_found_through_context() {
        let err: anyhow::Error = Err::<(), _>(SsmError::NotFound {
            key: "/x".to_string(),
        })
        .context("error retrieving key /x")
        .unwrap_err();
        assert_eq!(ExitStatus::from_error(&err), ExitStatus::NotFound);
        assert_eq!(ExitStatus::from_error(&err).code(), 4);
    }

    #[test]
    fn test_no_status_shares_the_usage_error_code() {
        let statuses = [
            ExitStatus::Success,
            ExitStatus::GeneralError,
            ExitStatus::Transport,
            ExitStatus::NotFound,
            ExitStatus::Validation,
            ExitStatus::AccessDenied,
            ExitStatus::Interrupted,
        ];
        assert!(statuses.iter().all(|s| s.code() != 2));

        let denied = SsmError::AccessDenied {
            key: "/x".to_string(),
            message: "no".to_string(),
        };
        assert_eq!(denied.exit_status().code(), 6);
    }

    #[test]
    fn test_unknown_error_is_general() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(ExitStatus::from_error(&err), ExitStatus::GeneralError);
        assert_eq!(SsmError::Cancelled.exit_status().code(), 130);
    }
}
