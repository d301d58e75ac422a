use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::cluster::{
    ClusterSnapshot, MasterInfo, ReplicaInfo, TableInfo, TabletInfo, TabletServerInfo,
};
use crate::error::{CheckError, Result, RpcError};
use crate::rpc::ClusterTransport;

fn master_fatal(err: RpcError) -> CheckError {
    // An unreachable master is fatal for the whole pass. Anything else the
    // master sends back that we cannot use is a protocol-level failure.
    if err.is_network() {
        CheckError::Unreachable(format!("master: {err}"))
    } else {
        CheckError::Rpc(err)
    }
}

/// Queries the master for tables, tablet layouts and the tablet server set,
/// and probes each tablet server for liveness. An unreachable tablet server
/// is marked not-running and recorded; only an unreachable master fails the
/// pass itself.
pub async fn fetch_cluster_snapshot(transport: &dyn ClusterTransport) -> Result<ClusterSnapshot> {
    let master = transport.master();
    master.ping().await.map_err(master_fatal)?;

    let server_descs = master.list_tablet_servers().await.map_err(master_fatal)?;
    let mut tablet_servers = BTreeMap::new();
    for desc in &server_descs {
        let info = match transport.tablet_server(desc).await {
            Ok(proxy) => match proxy.ping().await {
                Ok(ts) => TabletServerInfo::running(&desc.uuid, &desc.addr, ts),
                Err(err) => {
                    warn!(uuid = %desc.uuid, addr = %desc.addr, %err, "tablet server not running");
                    TabletServerInfo::unreachable(&desc.uuid, &desc.addr, err.to_string())
                }
            },
            Err(err) => {
                warn!(uuid = %desc.uuid, addr = %desc.addr, %err, "tablet server unreachable");
                TabletServerInfo::unreachable(&desc.uuid, &desc.addr, err.to_string())
            }
        };
        tablet_servers.insert(desc.uuid.clone(), info);
    }

    let table_descs = master.list_tables().await.map_err(master_fatal)?;
    let mut tables = Vec::with_capacity(table_descs.len());
    for desc in table_descs {
        let layout = master.table_layout(&desc.name).await.map_err(master_fatal)?;
        tables.push(TableInfo {
            name: desc.name,
            schema_id: desc.schema_id,
            num_replicas: desc.num_replicas,
            tablets: layout
                .into_iter()
                .map(|t| TabletInfo {
                    id: t.id,
                    start_key: t.start_key,
                    end_key: t.end_key,
                    replicas: t
                        .replicas
                        .into_iter()
                        .map(|r| ReplicaInfo {
                            server_uuid: r.server_uuid,
                            is_leader: r.is_leader,
                        })
                        .collect(),
                })
                .collect(),
        });
    }

    let snapshot = ClusterSnapshot {
        master: MasterInfo {
            addr: transport.master_addr(),
            running: true,
        },
        tablet_servers,
        tables,
        fetched_at: Utc::now(),
    };
    info!(
        tables = snapshot.tables.len(),
        tablets = snapshot.tablet_count(),
        tablet_servers = snapshot.tablet_servers.len(),
        "fetched cluster metadata"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockCluster;

    #[tokio::test]
    async fn test_fetch_healthy_cluster() {
        let cluster = MockCluster::new(3);
        cluster.create_table("t", 3, &[33, 66]);

        let snapshot = fetch_cluster_snapshot(&cluster).await.unwrap();
        assert!(snapshot.master.running);
        assert_eq!(snapshot.tablet_servers.len(), 3);
        assert!(snapshot.tablet_servers.values().all(|s| s.running));
        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.tablet_count(), 3);
        assert_eq!(snapshot.replica_count(), 9);
    }

    #[tokio::test]
    async fn test_fetch_master_unreachable_is_fatal() {
        let cluster = MockCluster::new(1);
        cluster.stop_master();

        let err = fetch_cluster_snapshot(&cluster).await.unwrap_err();
        assert!(matches!(err, CheckError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_fetch_tolerates_down_tablet_server() {
        let cluster = MockCluster::new(3);
        cluster.create_table("t", 3, &[]);
        let uuids = cluster.tablet_server_uuids();
        cluster.stop_tablet_server(&uuids[1]);

        let snapshot = fetch_cluster_snapshot(&cluster).await.unwrap();
        assert!(!snapshot.server_is_running(&uuids[1]));
        assert!(snapshot.server_is_running(&uuids[0]));
        let down = snapshot.server(&uuids[1]).unwrap();
        assert!(down.error.is_some());
    }
}
