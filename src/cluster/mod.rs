mod node;
mod table;
mod tablet;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use node::{MasterInfo, TabletServerInfo};
pub use table::TableInfo;
pub use tablet::{ReplicaInfo, TabletInfo};

/// The cluster metadata captured by one fetch pass.
///
/// A snapshot is immutable for the duration of a check pass; a new pass
/// re-fetches rather than mutating in place.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub master: MasterInfo,
    pub tablet_servers: BTreeMap<String, TabletServerInfo>,
    pub tables: Vec<TableInfo>,
    pub fetched_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn server(&self, uuid: &str) -> Option<&TabletServerInfo> {
        self.tablet_servers.get(uuid)
    }

    pub fn server_is_running(&self, uuid: &str) -> bool {
        self.tablet_servers.get(uuid).map(|s| s.running).unwrap_or(false)
    }

    pub fn stopped_servers(&self) -> Vec<&TabletServerInfo> {
        self.tablet_servers.values().filter(|s| !s.running).collect()
    }

    pub fn tablet_count(&self) -> usize {
        self.tables.iter().map(|t| t.tablets.len()).sum()
    }

    pub fn replica_count(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|t| t.tablets.iter())
            .map(|t| t.replicas.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ClusterSnapshot {
        let mut servers = BTreeMap::new();
        servers.insert(
            "ts-0".to_string(),
            TabletServerInfo::running("ts-0", "host-0:7050", 1),
        );
        servers.insert(
            "ts-1".to_string(),
            TabletServerInfo::unreachable("ts-1", "host-1:7050", "connection refused"),
        );
        ClusterSnapshot {
            master: MasterInfo {
                addr: "master:7051".into(),
                running: true,
            },
            tablet_servers: servers,
            tables: vec![TableInfo {
                name: "t".into(),
                schema_id: "s".into(),
                num_replicas: 2,
                tablets: vec![TabletInfo {
                    id: "tab-0".into(),
                    start_key: 0,
                    end_key: None,
                    replicas: vec![
                        ReplicaInfo {
                            server_uuid: "ts-0".into(),
                            is_leader: true,
                        },
                        ReplicaInfo {
                            server_uuid: "ts-1".into(),
                            is_leader: false,
                        },
                    ],
                }],
            }],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_lookups() {
        let s = snapshot();
        assert!(s.table("t").is_some());
        assert!(s.table("missing").is_none());
        assert!(s.server_is_running("ts-0"));
        assert!(!s.server_is_running("ts-1"));
        assert!(!s.server_is_running("ts-9"));
    }

    #[test]
    fn test_counts() {
        let s = snapshot();
        assert_eq!(s.tablet_count(), 1);
        assert_eq!(s.replica_count(), 2);
        assert_eq!(s.stopped_servers().len(), 1);
    }
}
