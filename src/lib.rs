pub mod check;
pub mod cluster;
pub mod error;
pub mod rpc;

pub use check::{
    checksum_cluster, CheckResult, CheckStatus, ChecksumOptions, ChecksumReport, ChecksumVerdict,
    ClusterChecker, ClusterReport, ReplicaChecksum, SnapshotTimestamp, TabletChecksum,
    DEFAULT_SCAN_CONCURRENCY,
};
pub use cluster::{
    ClusterSnapshot, MasterInfo, ReplicaInfo, TableInfo, TabletInfo, TabletServerInfo,
};
pub use error::{CheckError, Result, RpcError};
pub use rpc::{
    ClusterTransport, MasterRpc, MockCluster, ReplicaDesc, RpcResult, ServerDesc, TableDesc,
    TabletDesc, TabletServerRpc,
};
