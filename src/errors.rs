use std::fmt;

/// Pipeline error types.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Network failure, timeout, HTTP 5xx or HTTP 429. Worth retrying.
    TransientFetch {
        /// HTTP status, when the upstream answered at all.
        status: Option<u16>,
        message: String,
    },
    /// Any other HTTP 4xx. Retrying will not help.
    PermanentFetch { status: u16, message: String },
    /// The source's circuit breaker is open; no request was made.
    CircuitOpen { source_id: String },
    /// Malformed upstream record. Skipped, never retried.
    Validation(String),
    /// Some sources or filings failed while others succeeded.
    PartialBatchFailure { failed: usize, total: usize },
    /// A signal or health capability is unavailable.
    Provider { provider: String, message: String },
    /// Invalid configuration.
    Config(String),
}

impl PipelineError {
    /// Builds a fetch error from an HTTP status code.
    ///
    /// 5xx and 429 are transient, every other status is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || status == 429 {
            PipelineError::TransientFetch {
                status: Some(status),
                message,
            }
        } else {
            PipelineError::PermanentFetch { status, message }
        }
    }

    /// Shorthand for a transient error without a status (network, timeout).
    pub fn network(message: impl Into<String>) -> Self {
        PipelineError::TransientFetch {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the retry loop should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientFetch { .. })
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::TransientFetch {
                status: Some(status),
                message,
            } => write!(f, "Transient fetch error ({}): {}", status, message),
            PipelineError::TransientFetch {
                status: None,
                message,
            } => write!(f, "Transient fetch error: {}", message),
            PipelineError::PermanentFetch { status, message } => {
                write!(f, "Permanent fetch error ({}): {}", status, message)
            }
            PipelineError::CircuitOpen { source_id } => {
                write!(f, "Circuit open for source {}", source_id)
            }
            PipelineError::Validation(msg) => write!(f, "Validation error: {}", msg),
            PipelineError::PartialBatchFailure { failed, total } => {
                write!(f, "Partial batch failure: {} of {} failed", failed, total)
            }
            PipelineError::Provider { provider, message } => {
                write!(f, "Provider {} unavailable: {}", provider, message)
            }
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<reqwest::Error> for PipelineError {
    /// Converts a `reqwest::Error` into a `PipelineError`.
    ///
    /// Errors carrying a status are classified by it. A body that fails to
    /// decode is a validation error; timeouts and connection failures are
    /// transient.
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PipelineError::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => PipelineError::Validation(err.to_string()),
            None => PipelineError::network(err.to_string()),
        }
    }
}
