use serde::Serialize;

/// One stored copy of a tablet, hosted on one tablet server. The server is
/// referenced by uuid only; liveness is resolved against the snapshot's
/// server set, never through an owning link.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaInfo {
    pub server_uuid: String,
    pub is_leader: bool,
}

/// A contiguous key-range shard of a table. `end_key` of `None` means the
/// range is unbounded above.
#[derive(Debug, Clone, Serialize)]
pub struct TabletInfo {
    pub id: String,
    pub start_key: u64,
    pub end_key: Option<u64>,
    pub replicas: Vec<ReplicaInfo>,
}

impl TabletInfo {
    /// The designated leader, as a lookup key. `Some` only when exactly one
    /// replica claims leadership; zero or multiple claimants are structural
    /// inconsistencies the consistency check reports.
    pub fn leader_uuid(&self) -> Option<&str> {
        let mut leaders = self.replicas.iter().filter(|r| r.is_leader);
        match (leaders.next(), leaders.next()) {
            (Some(leader), None) => Some(leader.server_uuid.as_str()),
            _ => None,
        }
    }

    pub fn leader_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_leader).count()
    }

    pub fn range_label(&self) -> String {
        match self.end_key {
            Some(end) => format!("[{}, {})", self.start_key, end),
            None => format!("[{}, +inf)", self.start_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tablet(leaders: &[bool]) -> TabletInfo {
        TabletInfo {
            id: "t-0".into(),
            start_key: 0,
            end_key: Some(33),
            replicas: leaders
                .iter()
                .enumerate()
                .map(|(i, is_leader)| ReplicaInfo {
                    server_uuid: format!("ts-{i}"),
                    is_leader: *is_leader,
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_leader_resolves() {
        let t = tablet(&[false, true, false]);
        assert_eq!(t.leader_uuid(), Some("ts-1"));
        assert_eq!(t.leader_count(), 1);
    }

    #[test]
    fn test_no_leader_yields_none() {
        let t = tablet(&[false, false, false]);
        assert_eq!(t.leader_uuid(), None);
        assert_eq!(t.leader_count(), 0);
    }

    #[test]
    fn test_multiple_leaders_yield_none() {
        let t = tablet(&[true, true, false]);
        assert_eq!(t.leader_uuid(), None);
        assert_eq!(t.leader_count(), 2);
    }

    #[test]
    fn test_range_label() {
        assert_eq!(tablet(&[true]).range_label(), "[0, 33)");
        let unbounded = TabletInfo {
            id: "t-2".into(),
            start_key: 66,
            end_key: None,
            replicas: vec![],
        };
        assert_eq!(unbounded.range_label(), "[66, +inf)");
    }
}
