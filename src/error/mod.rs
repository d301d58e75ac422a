mod rpc_error;

use thiserror::Error;

pub use rpc_error::RpcError;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("not running: {0}")]
    NotRunning(String),

    #[error("inconsistent: {0}")]
    Inconsistent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckError {
    /// Timeouts must be distinguishable from proven divergence: a timed-out
    /// pass is inconclusive and may be retried, a mismatch is not.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, CheckError::TimedOut(_))
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, CheckError::ChecksumMismatch(_))
    }

    pub fn is_inconsistent(&self) -> bool {
        matches!(self, CheckError::Inconsistent(_))
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_predicate() {
        let err = CheckError::TimedOut("checksum pass exceeded 1s".into());
        assert!(err.is_timed_out());
        assert!(!err.is_mismatch());
    }

    #[test]
    fn test_mismatch_predicate() {
        let err = CheckError::ChecksumMismatch("tablet abc".into());
        assert!(err.is_mismatch());
        assert!(!err.is_timed_out());
    }

    #[test]
    fn test_rpc_error_converts() {
        let err: CheckError = RpcError::not_found("tablet t-0").into();
        assert!(matches!(err, CheckError::Rpc(_)));
        assert!(err.to_string().contains("tablet t-0"));
    }
}
