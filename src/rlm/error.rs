use std::time::Duration;

use thiserror::Error;

/// Result of any call that crosses an oracle boundary.
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Failure of a reading, judging, or proposal oracle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    /// Transport or provider error.
    #[error("oracle call failed: {0}")]
    Failed(String),

    /// The call did not complete within the configured budget.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The oracle answered with no content.
    #[error("oracle returned an empty response")]
    Empty,
}

impl OracleError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Why a sandbox snippet did not complete.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    /// The snippet named a denied capability and was never run.
    #[error("use of '{capability}' is not allowed")]
    Rejected { capability: String },

    /// The snippet ran and raised.
    #[error("{0}")]
    Runtime(String),

    /// The interpreter thread is gone or failed to start.
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

/// Terminal session errors. Everything else is recovered inside the loop.
#[derive(Debug, Error)]
pub enum RlmError {
    #[error("maximum recursion depth ({max_depth}) exceeded at depth {depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },
}
