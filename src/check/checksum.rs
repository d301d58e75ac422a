//! Distributed checksum verification: fan one scan out to every replica of
//! every selected tablet, bounded by a concurrency cap and one aggregate
//! deadline, then reduce the per-replica digests to per-tablet verdicts.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cluster::ClusterSnapshot;
use crate::error::{CheckError, Result, RpcError};
use crate::rpc::{ClusterTransport, RpcResult, ServerDesc};

pub const DEFAULT_SCAN_CONCURRENCY: usize = 16;

/// The logical point in time all replicas are read at in snapshot mode.
/// `Current` resolves to the master's current timestamp at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTimestamp {
    Current,
    At(u64),
}

#[derive(Debug, Clone)]
pub struct ChecksumOptions {
    /// Aggregate deadline for the whole pass, not per scan.
    pub timeout: Duration,
    /// Cap on simultaneously outstanding scans across the whole pass.
    pub scan_concurrency: usize,
    /// Snapshot mode pins every scan to one logical timestamp so concurrent
    /// writers cannot produce spurious mismatches.
    pub use_snapshot: bool,
    pub snapshot_timestamp: SnapshotTimestamp,
}

impl Default for ChecksumOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            use_snapshot: false,
            snapshot_timestamp: SnapshotTimestamp::Current,
        }
    }
}

impl ChecksumOptions {
    pub fn new(
        timeout: Duration,
        scan_concurrency: usize,
        use_snapshot: bool,
        snapshot_timestamp: SnapshotTimestamp,
    ) -> Self {
        Self {
            timeout,
            scan_concurrency,
            use_snapshot,
            snapshot_timestamp,
        }
    }

    pub fn snapshot_at(timestamp: u64) -> Self {
        Self {
            use_snapshot: true,
            snapshot_timestamp: SnapshotTimestamp::At(timestamp),
            ..Self::default()
        }
    }

    pub fn snapshot_current() -> Self {
        Self {
            use_snapshot: true,
            snapshot_timestamp: SnapshotTimestamp::Current,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumVerdict {
    Match,
    Mismatch,
    Incomplete,
}

impl fmt::Display for ChecksumVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumVerdict::Match => write!(f, "MATCH"),
            ChecksumVerdict::Mismatch => write!(f, "MISMATCH"),
            ChecksumVerdict::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReplicaChecksum {
    Digest(String),
    Error(String),
}

/// Per-tablet aggregate of replica digests, keyed by tablet server uuid.
#[derive(Debug, Clone, Serialize)]
pub struct TabletChecksum {
    pub table: String,
    pub tablet_id: String,
    /// Number of scans this tablet was supposed to answer (one per replica).
    pub expected_replicas: usize,
    pub replicas: BTreeMap<String, ReplicaChecksum>,
}

impl TabletChecksum {
    /// MATCH only if every replica answered without error with bitwise-equal
    /// digests. Conflicting digests are MISMATCH even when other replicas
    /// errored; errors or missing answers alone are INCOMPLETE, never a
    /// silent MATCH. Zero reachable replicas reduce to INCOMPLETE.
    pub fn verdict(&self) -> ChecksumVerdict {
        let digests: HashSet<&str> = self
            .replicas
            .values()
            .filter_map(|r| match r {
                ReplicaChecksum::Digest(d) => Some(d.as_str()),
                ReplicaChecksum::Error(_) => None,
            })
            .collect();

        if digests.len() > 1 {
            return ChecksumVerdict::Mismatch;
        }
        let errored = self
            .replicas
            .values()
            .any(|r| matches!(r, ReplicaChecksum::Error(_)));
        if errored || digests.is_empty() || self.replicas.len() < self.expected_replicas {
            return ChecksumVerdict::Incomplete;
        }
        ChecksumVerdict::Match
    }

    fn failure_detail(&self) -> String {
        let replicas: Vec<String> = self
            .replicas
            .iter()
            .map(|(uuid, outcome)| match outcome {
                ReplicaChecksum::Digest(d) => format!("{uuid}: {d}"),
                ReplicaChecksum::Error(e) => format!("{uuid}: error: {e}"),
            })
            .collect();
        format!(
            "table {} tablet {} {}: [{}]",
            self.table,
            self.tablet_id,
            self.verdict(),
            replicas.join(", ")
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChecksumReport {
    pub tablets: Vec<TabletChecksum>,
    /// The resolved snapshot timestamp, when snapshot mode was used.
    pub snapshot_timestamp: Option<u64>,
}

impl ChecksumReport {
    pub fn all_match(&self) -> bool {
        self.tablets
            .iter()
            .all(|t| t.verdict() == ChecksumVerdict::Match)
    }

    pub fn failing(&self) -> Vec<&TabletChecksum> {
        self.tablets
            .iter()
            .filter(|t| t.verdict() != ChecksumVerdict::Match)
            .collect()
    }

    /// Conjunction of the table's tablet verdicts.
    pub fn verdict_for_table(&self, table: &str) -> ChecksumVerdict {
        let verdicts: Vec<ChecksumVerdict> = self
            .tablets
            .iter()
            .filter(|t| t.table == table)
            .map(|t| t.verdict())
            .collect();
        if verdicts.contains(&ChecksumVerdict::Mismatch) {
            ChecksumVerdict::Mismatch
        } else if verdicts.contains(&ChecksumVerdict::Incomplete) {
            ChecksumVerdict::Incomplete
        } else {
            ChecksumVerdict::Match
        }
    }

    /// Names every non-matching tablet and each of its replicas, so
    /// operators can target remediation.
    pub fn failure_summary(&self) -> String {
        let failing = self.failing();
        format!(
            "{} of {} tablet(s) failed verification: {}",
            failing.len(),
            self.tablets.len(),
            failing
                .iter()
                .map(|t| t.failure_detail())
                .collect::<Vec<_>>()
                .join(" | ")
        )
    }
}

/// Runs the checksum pass over the snapshot and reduces the results.
/// Mismatches and incomplete tablets are reported in the returned
/// `ChecksumReport`; only deadline expiry, a selection matching no
/// tablets, and dispatch-level protocol failures surface as `Err`.
pub async fn checksum_cluster(
    transport: Arc<dyn ClusterTransport>,
    snapshot: &ClusterSnapshot,
    table_filter: &[String],
    tablet_filter: &[String],
    options: &ChecksumOptions,
) -> Result<ChecksumReport> {
    if options.scan_concurrency == 0 {
        return Err(CheckError::Internal(
            "scan_concurrency must be greater than zero".to_string(),
        ));
    }
    // A zero or already-elapsed deadline is conclusive on its own: nothing
    // can complete in time, and zero dispatched work must never read as a
    // MATCH.
    if options.timeout.is_zero() {
        return Err(CheckError::TimedOut(
            "checksum deadline elapsed before any scan completed".to_string(),
        ));
    }
    let deadline = tokio::time::Instant::now() + options.timeout;

    // The sentinel resolution is a remote call and counts against the same
    // deadline as the scans; a stalled master must not extend the pass.
    let snapshot_ts = if options.use_snapshot {
        let ts = match options.snapshot_timestamp {
            SnapshotTimestamp::At(ts) => ts,
            SnapshotTimestamp::Current => {
                match tokio::time::timeout_at(deadline, transport.master().current_timestamp())
                    .await
                {
                    Ok(resolved) => resolved.map_err(CheckError::Rpc)?,
                    Err(_) => {
                        return Err(CheckError::TimedOut(format!(
                            "checksum pass exceeded {:?} while resolving the snapshot timestamp",
                            options.timeout
                        )))
                    }
                }
            }
        };
        Some(ts)
    } else {
        None
    };

    let mut results: BTreeMap<String, TabletChecksum> = BTreeMap::new();
    let semaphore = Arc::new(Semaphore::new(options.scan_concurrency));
    let mut scans: JoinSet<(String, String, RpcResult<String>)> = JoinSet::new();

    for table in &snapshot.tables {
        if !table_filter.is_empty() && !table_filter.contains(&table.name) {
            continue;
        }
        for tablet in &table.tablets {
            if !tablet_filter.is_empty() && !tablet_filter.contains(&tablet.id) {
                continue;
            }
            let entry = results.entry(tablet.id.clone()).or_insert(TabletChecksum {
                table: table.name.clone(),
                tablet_id: tablet.id.clone(),
                expected_replicas: tablet.replicas.len(),
                replicas: BTreeMap::new(),
            });

            for replica in &tablet.replicas {
                match snapshot.server(&replica.server_uuid) {
                    None => {
                        entry.replicas.insert(
                            replica.server_uuid.clone(),
                            ReplicaChecksum::Error("unknown tablet server".to_string()),
                        );
                    }
                    Some(server) if !server.running => {
                        let cause = server.error.as_deref().unwrap_or("not running");
                        entry.replicas.insert(
                            replica.server_uuid.clone(),
                            ReplicaChecksum::Error(format!("tablet server down: {cause}")),
                        );
                    }
                    Some(server) => {
                        let desc = ServerDesc {
                            uuid: server.uuid.clone(),
                            addr: server.addr.clone(),
                        };
                        let transport = Arc::clone(&transport);
                        let semaphore = Arc::clone(&semaphore);
                        let tablet_id = tablet.id.clone();
                        scans.spawn(async move {
                            let _permit = match semaphore.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => {
                                    return (
                                        tablet_id,
                                        desc.uuid,
                                        Err(RpcError::remote("scan pool closed")),
                                    )
                                }
                            };
                            let outcome = match transport.tablet_server(&desc).await {
                                Ok(proxy) => proxy.checksum(&tablet_id, snapshot_ts).await,
                                Err(err) => Err(err),
                            };
                            (tablet_id, desc.uuid, outcome)
                        });
                    }
                }
            }
        }
    }

    // An empty selection verified nothing; reporting it as a pass would be
    // misleading when a filter has a typo or the cluster holds no tables.
    if results.is_empty() {
        return Err(CheckError::NotFound(
            "no tablets matched the checksum filters".to_string(),
        ));
    }

    let total_scans = scans.len();
    info!(
        tablets = results.len(),
        scans = total_scans,
        snapshot_timestamp = ?snapshot_ts,
        concurrency = options.scan_concurrency,
        "dispatching checksum scans"
    );

    let mut completed = 0usize;
    loop {
        match tokio::time::timeout_at(deadline, scans.join_next()).await {
            Err(_) => {
                // Deadline reached: stragglers are failed-with-timeout, not
                // awaited. A timeout is inconclusive, never a mismatch.
                scans.abort_all();
                return Err(CheckError::TimedOut(format!(
                    "checksum pass exceeded {:?} with {} of {} scans outstanding",
                    options.timeout,
                    total_scans - completed,
                    total_scans
                )));
            }
            Ok(None) => break,
            Ok(Some(Ok((tablet_id, server_uuid, outcome)))) => {
                completed += 1;
                let replica = match outcome {
                    Ok(digest) => {
                        debug!(tablet = %tablet_id, server = %server_uuid, "scan complete");
                        ReplicaChecksum::Digest(digest)
                    }
                    Err(err) => {
                        warn!(tablet = %tablet_id, server = %server_uuid, %err, "scan failed");
                        ReplicaChecksum::Error(err.to_string())
                    }
                };
                if let Some(entry) = results.get_mut(&tablet_id) {
                    entry.replicas.insert(server_uuid, replica);
                }
            }
            Ok(Some(Err(join_err))) => {
                scans.abort_all();
                return Err(CheckError::Internal(format!(
                    "checksum scan task failed: {join_err}"
                )));
            }
        }
    }

    let report = ChecksumReport {
        tablets: results.into_values().collect(),
        snapshot_timestamp: snapshot_ts,
    };
    let failing = report.failing().len();
    if failing == 0 {
        info!(tablets = report.tablets.len(), "all tablet checksums match");
    } else {
        warn!(
            failing,
            total = report.tablets.len(),
            "tablet checksum verification failed"
        );
    }
    Ok(report)
}
