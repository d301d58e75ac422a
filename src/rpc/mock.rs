//! An in-process simulated cluster implementing the RPC traits.
//!
//! Used by the integration tests and the CLI driver. The simulation keeps a
//! logical clock and commits every row to all replicas of its tablet under
//! one lock, so any timestamp observed through `current_timestamp` covers
//! fully-replicated data and snapshot scans at that timestamp agree across
//! replicas even while writers are active.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{
    ClusterTransport, MasterRpc, ReplicaDesc, RpcResult, ServerDesc, TableDesc, TabletDesc,
    TabletServerRpc,
};
use crate::error::RpcError;

#[derive(Debug, Clone)]
struct Row {
    ts: u64,
    value: i64,
}

#[derive(Debug)]
struct ServerState {
    addr: String,
    down: bool,
    scan_delay: Duration,
    // tablet id -> rows by key
    rows: HashMap<String, BTreeMap<u64, Row>>,
}

#[derive(Debug)]
struct TabletState {
    id: String,
    start_key: u64,
    end_key: Option<u64>,
    replica_uuids: Vec<String>,
    leader: Option<String>,
}

impl TabletState {
    fn contains_key(&self, key: u64) -> bool {
        key >= self.start_key && self.end_key.map(|end| key < end).unwrap_or(true)
    }
}

#[derive(Debug)]
struct TableState {
    desc: TableDesc,
    tablets: Vec<TabletState>,
}

#[derive(Debug)]
struct MockState {
    clock: u64,
    master_addr: String,
    master_down: bool,
    timestamp_delay: Duration,
    servers: BTreeMap<String, ServerState>,
    tables: Vec<TableState>,
}

/// An in-process cluster of one master and N tablet servers.
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new(num_tablet_servers: usize) -> Self {
        let mut servers = BTreeMap::new();
        for i in 0..num_tablet_servers {
            let uuid = Uuid::new_v4().to_string();
            servers.insert(
                uuid,
                ServerState {
                    addr: format!("tserver-{i}.mock:7050"),
                    down: false,
                    scan_delay: Duration::ZERO,
                    rows: HashMap::new(),
                },
            );
        }
        Self {
            state: Arc::new(Mutex::new(MockState {
                clock: 0,
                master_addr: "master.mock:7051".to_string(),
                master_down: false,
                timestamp_delay: Duration::ZERO,
                servers,
                tables: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock cluster lock poisoned")
    }

    /// Creates a range-partitioned table with one tablet per split interval
    /// and round-robin replica placement. Returns the tablet ids in range
    /// order. The replica set is capped at the number of distinct servers,
    /// so over-replicated configs come up short (visible to the consistency
    /// check, as intended).
    pub fn create_table(
        &self,
        name: &str,
        num_replicas: usize,
        split_points: &[u64],
    ) -> Vec<String> {
        let mut state = self.lock();
        let server_uuids: Vec<String> = state.servers.keys().cloned().collect();
        let placed = num_replicas.min(server_uuids.len());

        let mut bounds = vec![0u64];
        bounds.extend_from_slice(split_points);

        let mut tablets = Vec::new();
        for (i, start) in bounds.iter().enumerate() {
            let end = bounds.get(i + 1).copied();
            let replica_uuids: Vec<String> = (0..placed)
                .map(|j| server_uuids[(i + j) % server_uuids.len()].clone())
                .collect();
            let leader = replica_uuids.first().cloned();
            tablets.push(TabletState {
                id: Uuid::new_v4().to_string(),
                start_key: *start,
                end_key: end,
                replica_uuids,
                leader,
            });
        }

        let ids = tablets.iter().map(|t| t.id.clone()).collect();
        state.tables.push(TableState {
            desc: TableDesc {
                name: name.to_string(),
                schema_id: Uuid::new_v4().to_string(),
                num_replicas,
            },
            tablets,
        });
        ids
    }

    /// Commits one row to every replica of its tablet at the next logical
    /// timestamp. Returns the commit timestamp.
    pub fn insert_row(&self, table: &str, key: u64, value: i64) -> RpcResult<u64> {
        let mut state = self.lock();
        state.clock += 1;
        let ts = state.clock;

        let (tablet_id, replica_uuids) = {
            let table = state
                .tables
                .iter()
                .find(|t| t.desc.name == table)
                .ok_or_else(|| RpcError::not_found(format!("table {table}")))?;
            let tablet = table
                .tablets
                .iter()
                .find(|t| t.contains_key(key))
                .ok_or_else(|| RpcError::not_found(format!("tablet for key {key}")))?;
            (tablet.id.clone(), tablet.replica_uuids.clone())
        };

        for uuid in &replica_uuids {
            if let Some(server) = state.servers.get_mut(uuid) {
                server
                    .rows
                    .entry(tablet_id.clone())
                    .or_default()
                    .insert(key, Row { ts, value });
            }
        }
        Ok(ts)
    }

    pub fn latest_timestamp(&self) -> u64 {
        self.lock().clock
    }

    pub fn tablet_server_uuids(&self) -> Vec<String> {
        self.lock().servers.keys().cloned().collect()
    }

    pub fn stop_master(&self) {
        self.lock().master_down = true;
    }

    pub fn restart_master(&self) {
        self.lock().master_down = false;
    }

    pub fn stop_tablet_server(&self, uuid: &str) {
        if let Some(server) = self.lock().servers.get_mut(uuid) {
            server.down = true;
        }
    }

    pub fn restart_tablet_server(&self, uuid: &str) {
        if let Some(server) = self.lock().servers.get_mut(uuid) {
            server.down = false;
        }
    }

    /// Every `current_timestamp` call on the master stalls for `delay`
    /// first, as a master stuck in a long pause would.
    pub fn set_timestamp_delay(&self, delay: Duration) {
        self.lock().timestamp_delay = delay;
    }

    /// Every checksum scan on this server stalls for `delay` first.
    pub fn set_scan_delay(&self, uuid: &str, delay: Duration) {
        if let Some(server) = self.lock().servers.get_mut(uuid) {
            server.scan_delay = delay;
        }
    }

    /// Withdraws leadership from every tablet of the table, as if elections
    /// had not completed yet.
    pub fn clear_leaders(&self, table: &str) {
        let mut state = self.lock();
        if let Some(table) = state.tables.iter_mut().find(|t| t.desc.name == table) {
            for tablet in &mut table.tablets {
                tablet.leader = None;
            }
        }
    }

    /// Elects the first replica of every tablet of the table.
    pub fn elect_leaders(&self, table: &str) {
        let mut state = self.lock();
        if let Some(table) = state.tables.iter_mut().find(|t| t.desc.name == table) {
            for tablet in &mut table.tablets {
                tablet.leader = tablet.replica_uuids.first().cloned();
            }
        }
    }

    /// Writes a rogue row to exactly one replica of the tablet, diverging it
    /// from its peers. Returns the uuid of the corrupted server.
    pub fn corrupt_replica(&self, tablet_id: &str) -> Option<String> {
        let mut state = self.lock();
        state.clock += 1;
        let ts = state.clock;

        let victim = state
            .tables
            .iter()
            .flat_map(|t| t.tablets.iter())
            .find(|t| t.id == tablet_id)
            .and_then(|t| t.replica_uuids.first().cloned())?;

        let server = state.servers.get_mut(&victim)?;
        server
            .rows
            .entry(tablet_id.to_string())
            .or_default()
            .insert(u64::MAX, Row { ts, value: -1 });
        Some(victim)
    }
}

impl MockState {
    fn tablet_exists(&self, tablet_id: &str) -> bool {
        self.tables
            .iter()
            .flat_map(|t| t.tablets.iter())
            .any(|t| t.id == tablet_id)
    }
}

struct MockMaster {
    state: Arc<Mutex<MockState>>,
}

impl MockMaster {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock cluster lock poisoned")
    }

    fn check_up(state: &MockState) -> RpcResult<()> {
        if state.master_down {
            Err(RpcError::network(&state.master_addr, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MasterRpc for MockMaster {
    async fn ping(&self) -> RpcResult<()> {
        let state = self.lock();
        Self::check_up(&state)
    }

    async fn list_tables(&self) -> RpcResult<Vec<TableDesc>> {
        let state = self.lock();
        Self::check_up(&state)?;
        Ok(state.tables.iter().map(|t| t.desc.clone()).collect())
    }

    async fn table_layout(&self, table: &str) -> RpcResult<Vec<TabletDesc>> {
        let state = self.lock();
        Self::check_up(&state)?;
        let table = state
            .tables
            .iter()
            .find(|t| t.desc.name == table)
            .ok_or_else(|| RpcError::not_found(format!("table {table}")))?;
        Ok(table
            .tablets
            .iter()
            .map(|t| TabletDesc {
                id: t.id.clone(),
                start_key: t.start_key,
                end_key: t.end_key,
                replicas: t
                    .replica_uuids
                    .iter()
                    .map(|uuid| ReplicaDesc {
                        server_uuid: uuid.clone(),
                        is_leader: t.leader.as_deref() == Some(uuid.as_str()),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn list_tablet_servers(&self) -> RpcResult<Vec<ServerDesc>> {
        let state = self.lock();
        Self::check_up(&state)?;
        Ok(state
            .servers
            .iter()
            .map(|(uuid, s)| ServerDesc {
                uuid: uuid.clone(),
                addr: s.addr.clone(),
            })
            .collect())
    }

    async fn current_timestamp(&self) -> RpcResult<u64> {
        let delay = self.lock().timestamp_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        Self::check_up(&state)?;
        Ok(state.clock)
    }
}

struct MockTabletServer {
    uuid: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTabletServer {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock cluster lock poisoned")
    }
}

#[async_trait]
impl TabletServerRpc for MockTabletServer {
    async fn ping(&self) -> RpcResult<u64> {
        let state = self.lock();
        let server = state
            .servers
            .get(&self.uuid)
            .ok_or_else(|| RpcError::not_found(format!("tablet server {}", self.uuid)))?;
        if server.down {
            return Err(RpcError::network(&server.addr, "connection refused"));
        }
        Ok(state.clock)
    }

    async fn checksum(
        &self,
        tablet_id: &str,
        snapshot_timestamp: Option<u64>,
    ) -> RpcResult<String> {
        let delay = {
            let state = self.lock();
            state
                .servers
                .get(&self.uuid)
                .map(|s| s.scan_delay)
                .unwrap_or(Duration::ZERO)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        let server = state
            .servers
            .get(&self.uuid)
            .ok_or_else(|| RpcError::not_found(format!("tablet server {}", self.uuid)))?;
        if server.down {
            return Err(RpcError::network(&server.addr, "connection refused"));
        }
        if !state.tablet_exists(tablet_id) {
            return Err(RpcError::not_found(format!("tablet {tablet_id}")));
        }

        let mut hasher = Sha256::new();
        if let Some(rows) = server.rows.get(tablet_id) {
            for (key, row) in rows {
                if snapshot_timestamp.map(|snap| row.ts <= snap).unwrap_or(true) {
                    hasher.update(key.to_be_bytes());
                    hasher.update(row.ts.to_be_bytes());
                    hasher.update(row.value.to_be_bytes());
                }
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[async_trait]
impl ClusterTransport for MockCluster {
    fn master(&self) -> Arc<dyn MasterRpc> {
        Arc::new(MockMaster {
            state: Arc::clone(&self.state),
        })
    }

    fn master_addr(&self) -> String {
        self.lock().master_addr.clone()
    }

    async fn tablet_server(&self, server: &ServerDesc) -> RpcResult<Arc<dyn TabletServerRpc>> {
        let state = self.lock();
        if !state.servers.contains_key(&server.uuid) {
            return Err(RpcError::not_found(format!("tablet server {}", server.uuid)));
        }
        Ok(Arc::new(MockTabletServer {
            uuid: server.uuid.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}
