use serde::Serialize;

/// The cluster's metadata authority, as observed during one fetch pass.
#[derive(Debug, Clone, Serialize)]
pub struct MasterInfo {
    pub addr: String,
    pub running: bool,
}

/// One storage node, as observed during one fetch pass.
///
/// `error` records why the server was marked not-running so the final
/// report can name the cause, not just the fact.
#[derive(Debug, Clone, Serialize)]
pub struct TabletServerInfo {
    pub uuid: String,
    pub addr: String,
    pub running: bool,
    /// The server's own timestamp estimate, reported by its liveness probe.
    pub last_timestamp: Option<u64>,
    pub error: Option<String>,
}

impl TabletServerInfo {
    pub fn running(uuid: impl Into<String>, addr: impl Into<String>, last_timestamp: u64) -> Self {
        Self {
            uuid: uuid.into(),
            addr: addr.into(),
            running: true,
            last_timestamp: Some(last_timestamp),
            error: None,
        }
    }

    pub fn unreachable(
        uuid: impl Into<String>,
        addr: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            addr: addr.into(),
            running: false,
            last_timestamp: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_server() {
        let ts = TabletServerInfo::running("ts-1", "host-1:7050", 42);
        assert!(ts.running);
        assert_eq!(ts.last_timestamp, Some(42));
        assert!(ts.error.is_none());
    }

    #[test]
    fn test_unreachable_server_keeps_cause() {
        let ts = TabletServerInfo::unreachable("ts-2", "host-2:7050", "connection refused");
        assert!(!ts.running);
        assert_eq!(ts.error.as_deref(), Some("connection refused"));
    }
}
