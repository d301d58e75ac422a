mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RpcError;

pub use mock::MockCluster;

pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// A tablet server as listed by the master.
#[derive(Debug, Clone)]
pub struct ServerDesc {
    pub uuid: String,
    pub addr: String,
}

/// A table as listed by the master.
#[derive(Debug, Clone)]
pub struct TableDesc {
    pub name: String,
    pub schema_id: String,
    pub num_replicas: usize,
}

#[derive(Debug, Clone)]
pub struct ReplicaDesc {
    pub server_uuid: String,
    pub is_leader: bool,
}

/// One tablet of a table's layout, as reported by the master.
#[derive(Debug, Clone)]
pub struct TabletDesc {
    pub id: String,
    pub start_key: u64,
    pub end_key: Option<u64>,
    pub replicas: Vec<ReplicaDesc>,
}

/// The master's RPC surface consumed by the checker.
#[async_trait]
pub trait MasterRpc: Send + Sync {
    async fn ping(&self) -> RpcResult<()>;

    async fn list_tables(&self) -> RpcResult<Vec<TableDesc>>;

    async fn table_layout(&self, table: &str) -> RpcResult<Vec<TabletDesc>>;

    async fn list_tablet_servers(&self) -> RpcResult<Vec<ServerDesc>>;

    /// The master's current logical timestamp, used to resolve the
    /// "current timestamp" snapshot sentinel at dispatch time.
    async fn current_timestamp(&self) -> RpcResult<u64>;
}

/// The tablet-server RPC surface consumed by the checker.
#[async_trait]
pub trait TabletServerRpc: Send + Sync {
    /// Liveness probe. Returns the server's own timestamp estimate.
    async fn ping(&self) -> RpcResult<u64>;

    /// Computes a digest over the full logical content of one replica,
    /// either as of "now" or as of `snapshot_timestamp` when given.
    async fn checksum(&self, tablet_id: &str, snapshot_timestamp: Option<u64>)
        -> RpcResult<String>;
}

/// The transport/session layer. Connections are pooled and reused by the
/// implementation; the checker only ever issues read-side requests.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    fn master(&self) -> Arc<dyn MasterRpc>;

    fn master_addr(&self) -> String;

    async fn tablet_server(&self, server: &ServerDesc) -> RpcResult<Arc<dyn TabletServerRpc>>;
}
