//! Structural consistency: replication factor, leadership, leader liveness.
//!
//! Pure over the fetched snapshot. Right after a table is created this check
//! legitimately fails until leader election completes; callers re-invoke it
//! on their own polling schedule, the check itself never sleeps or retries.

use tracing::{debug, warn};

use crate::cluster::{ClusterSnapshot, TableInfo, TabletInfo};
use crate::error::{CheckError, Result};

fn tablet_problems(snapshot: &ClusterSnapshot, table: &TableInfo, tablet: &TabletInfo) -> Vec<String> {
    let mut problems = Vec::new();

    if tablet.replicas.len() != table.num_replicas {
        problems.push(format!(
            "has {} replicas, replication factor is {}",
            tablet.replicas.len(),
            table.num_replicas
        ));
    }

    match tablet.leader_count() {
        1 => {
            if let Some(leader) = tablet.leader_uuid() {
                if !snapshot.server_is_running(leader) {
                    problems.push(format!("leader {leader} is not running"));
                }
            }
        }
        0 => problems.push("no elected leader".to_string()),
        n => problems.push(format!("{n} replicas claim leadership")),
    }

    problems
}

/// A table is consistent only if all its tablets are; the overall check
/// fails if any table is inconsistent, naming each offending tablet.
pub fn check_tables_consistency(snapshot: &ClusterSnapshot) -> Result<()> {
    let mut offenders = Vec::new();

    for table in &snapshot.tables {
        let mut bad_tablets = 0;
        for tablet in &table.tablets {
            let problems = tablet_problems(snapshot, table, tablet);
            if !problems.is_empty() {
                bad_tablets += 1;
                offenders.push(format!(
                    "table {} tablet {} {}: {}",
                    table.name,
                    tablet.id,
                    tablet.range_label(),
                    problems.join("; ")
                ));
            }
        }
        if bad_tablets == 0 {
            debug!(table = %table.name, tablets = table.tablets.len(), "table consistent");
        } else {
            warn!(
                table = %table.name,
                inconsistent = bad_tablets,
                total = table.tablets.len(),
                "table inconsistent"
            );
        }
    }

    if offenders.is_empty() {
        Ok(())
    } else {
        Err(CheckError::Inconsistent(format!(
            "{} tablet(s) inconsistent: {}",
            offenders.len(),
            offenders.join(" | ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MasterInfo, ReplicaInfo, TabletServerInfo};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snapshot(replicas: &[(&str, bool)], num_replicas: usize, stop: &[&str]) -> ClusterSnapshot {
        let mut tablet_servers = BTreeMap::new();
        for (uuid, _) in replicas {
            let info = if stop.contains(uuid) {
                TabletServerInfo::unreachable(*uuid, format!("{uuid}:7050"), "connection refused")
            } else {
                TabletServerInfo::running(*uuid, format!("{uuid}:7050"), 1)
            };
            tablet_servers.insert(uuid.to_string(), info);
        }
        ClusterSnapshot {
            master: MasterInfo {
                addr: "master:7051".into(),
                running: true,
            },
            tablet_servers,
            tables: vec![TableInfo {
                name: "t".into(),
                schema_id: "s".into(),
                num_replicas,
                tablets: vec![TabletInfo {
                    id: "tab-0".into(),
                    start_key: 0,
                    end_key: None,
                    replicas: replicas
                        .iter()
                        .map(|(uuid, is_leader)| ReplicaInfo {
                            server_uuid: uuid.to_string(),
                            is_leader: *is_leader,
                        })
                        .collect(),
                }],
            }],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_consistent_table() {
        let s = snapshot(&[("ts-0", true), ("ts-1", false), ("ts-2", false)], 3, &[]);
        assert!(check_tables_consistency(&s).is_ok());
    }

    #[test]
    fn test_replica_deficit_is_reported() {
        let s = snapshot(&[("ts-0", true), ("ts-1", false)], 3, &[]);
        let err = check_tables_consistency(&s).unwrap_err();
        assert!(err.is_inconsistent());
        assert!(err.to_string().contains("has 2 replicas, replication factor is 3"));
    }

    #[test]
    fn test_missing_leader_is_reported() {
        let s = snapshot(&[("ts-0", false), ("ts-1", false), ("ts-2", false)], 3, &[]);
        let err = check_tables_consistency(&s).unwrap_err();
        assert!(err.to_string().contains("no elected leader"));
    }

    #[test]
    fn test_split_leadership_is_reported() {
        let s = snapshot(&[("ts-0", true), ("ts-1", true), ("ts-2", false)], 3, &[]);
        let err = check_tables_consistency(&s).unwrap_err();
        assert!(err.to_string().contains("2 replicas claim leadership"));
    }

    #[test]
    fn test_dead_leader_is_reported() {
        let s = snapshot(&[("ts-0", true), ("ts-1", false), ("ts-2", false)], 3, &["ts-0"]);
        let err = check_tables_consistency(&s).unwrap_err();
        assert!(err.to_string().contains("leader ts-0 is not running"));
    }

    #[test]
    fn test_offending_tablet_is_named() {
        let s = snapshot(&[("ts-0", false)], 1, &[]);
        let err = check_tables_consistency(&s).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("table t"));
        assert!(msg.contains("tablet tab-0"));
    }
}
