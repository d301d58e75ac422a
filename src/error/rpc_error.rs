use std::fmt;

/// Error reported by the transport/session layer for a single remote call.
#[derive(Debug, Clone)]
pub enum RpcError {
    Network {
        addr: String,
        reason: String,
    },

    NotFound {
        resource: String,
    },

    TimedOut {
        operation: String,
        after_ms: Option<u64>,
    },

    Remote {
        code: Option<String>,
        message: String,
    },
}

impl RpcError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RpcError::Network { .. } => "NETWORK_ERROR",
            RpcError::NotFound { .. } => "NOT_FOUND",
            RpcError::TimedOut { .. } => "TIMED_OUT",
            RpcError::Remote { .. } => "REMOTE_ERROR",
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RpcError::Network { .. })
    }

    pub fn network(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        RpcError::Network {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        RpcError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        RpcError::Remote {
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Network { addr, reason } => {
                write!(f, "network error contacting {addr}: {reason}")
            }

            RpcError::NotFound { resource } => {
                write!(f, "not found: {resource}")
            }

            RpcError::TimedOut { operation, after_ms } => {
                write!(f, "timed out during {operation}")?;
                if let Some(ms) = after_ms {
                    write!(f, " (after {}ms)", ms)?;
                }
                Ok(())
            }

            RpcError::Remote { code, message } => {
                if let Some(c) = code {
                    write!(f, "remote error [{c}]: {message}")
                } else {
                    write!(f, "remote error: {message}")
                }
            }
        }
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::network("a", "b").error_code(), "NETWORK_ERROR");
        assert_eq!(RpcError::not_found("tablet x").error_code(), "NOT_FOUND");
        assert_eq!(
            RpcError::TimedOut {
                operation: "scan".into(),
                after_ms: None,
            }
            .error_code(),
            "TIMED_OUT"
        );
        assert_eq!(RpcError::remote("boom").error_code(), "REMOTE_ERROR");
    }

    #[test]
    fn test_display_network() {
        let err = RpcError::network("ts-1:7050", "connection refused");
        assert_eq!(
            err.to_string(),
            "network error contacting ts-1:7050: connection refused"
        );
        assert!(err.is_network());
    }

    #[test]
    fn test_display_timed_out_with_duration() {
        let err = RpcError::TimedOut {
            operation: "checksum scan".into(),
            after_ms: Some(30000),
        };
        assert_eq!(err.to_string(), "timed out during checksum scan (after 30000ms)");
    }

    #[test]
    fn test_display_remote_with_code() {
        let err = RpcError::Remote {
            code: Some("SERVICE_UNAVAILABLE".into()),
            message: "shutting down".into(),
        };
        assert_eq!(err.to_string(), "remote error [SERVICE_UNAVAILABLE]: shutting down");
    }

    #[test]
    fn test_rpc_error_is_error_trait() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&RpcError::not_found("table t"));
    }
}
