mod checksum;
mod consistency;
mod fetch;
mod health;
mod report;

use std::sync::Arc;

use crate::cluster::ClusterSnapshot;
use crate::error::{CheckError, Result};
use crate::rpc::ClusterTransport;

pub use checksum::{
    checksum_cluster, ChecksumOptions, ChecksumReport, ChecksumVerdict, ReplicaChecksum,
    SnapshotTimestamp, TabletChecksum, DEFAULT_SCAN_CONCURRENCY,
};
pub use report::{CheckResult, CheckStatus, ClusterReport};

/// The verification facade: fetch a metadata snapshot once, then run health,
/// consistency and checksum checks against it. The engine performs no
/// internal retries; transiently-failing checks (leader election in flight,
/// replicas catching up) are re-invoked by the caller on a polling schedule.
pub struct ClusterChecker {
    transport: Arc<dyn ClusterTransport>,
    snapshot: Option<ClusterSnapshot>,
}

impl ClusterChecker {
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            transport,
            snapshot: None,
        }
    }

    /// Fetches tables, tablet layouts and tablet server liveness from the
    /// master, replacing any previously held snapshot. Fails only if the
    /// master itself is unreachable.
    pub async fn fetch_table_and_tablet_info(&mut self) -> Result<()> {
        self.snapshot = Some(fetch::fetch_cluster_snapshot(self.transport.as_ref()).await?);
        Ok(())
    }

    pub fn snapshot(&self) -> Option<&ClusterSnapshot> {
        self.snapshot.as_ref()
    }

    fn require_snapshot(&self) -> Result<&ClusterSnapshot> {
        self.snapshot.as_ref().ok_or_else(|| {
            CheckError::Internal(
                "cluster metadata not fetched; call fetch_table_and_tablet_info first".to_string(),
            )
        })
    }

    pub fn check_master_running(&self) -> Result<()> {
        health::check_master_running(self.require_snapshot()?)
    }

    pub fn check_tablet_servers_running(&self) -> Result<()> {
        health::check_tablet_servers_running(self.require_snapshot()?)
    }

    pub fn check_tables_consistency(&self) -> Result<()> {
        consistency::check_tables_consistency(self.require_snapshot()?)
    }

    /// Verifies that the replicas of every selected tablet hold identical
    /// data. Empty filters select everything. Fails with `ChecksumMismatch`
    /// naming every offending tablet and replica, or with the distinct
    /// `TimedOut` condition when the aggregate deadline expires first.
    pub async fn checksum_data(
        &self,
        table_filter: &[String],
        tablet_filter: &[String],
        options: &ChecksumOptions,
    ) -> Result<ChecksumReport> {
        let snapshot = self.require_snapshot()?;
        let report = checksum::checksum_cluster(
            Arc::clone(&self.transport),
            snapshot,
            table_filter,
            tablet_filter,
            options,
        )
        .await?;
        if report.all_match() {
            Ok(report)
        } else {
            Err(CheckError::ChecksumMismatch(report.failure_summary()))
        }
    }

    /// Runs the whole suite (fetch, health, consistency, checksum) and
    /// merges the outcomes into one report. The report itself is always
    /// produced; only the fetch failing leaves the later checks skipped.
    pub async fn run_all(&mut self, options: &ChecksumOptions) -> Result<ClusterReport> {
        let mut report = ClusterReport::new();

        if let Err(err) = self.fetch_table_and_tablet_info().await {
            report.add(CheckResult::failed("fetch metadata", err.to_string()));
            for name in ["master health", "tablet server health", "table consistency", "checksum"] {
                report.add(CheckResult::skipped(name, "metadata not fetched"));
            }
            return Ok(report);
        }
        let snapshot = self.require_snapshot()?;
        report.add(CheckResult::passed(
            "fetch metadata",
            format!(
                "{} table(s), {} tablet(s), {} tablet server(s)",
                snapshot.tables.len(),
                snapshot.tablet_count(),
                snapshot.tablet_servers.len()
            ),
        ));

        report.add(match self.check_master_running() {
            Ok(()) => CheckResult::passed("master health", "master is running"),
            Err(err) => CheckResult::failed("master health", err.to_string()),
        });

        report.add(match self.check_tablet_servers_running() {
            Ok(()) => CheckResult::passed("tablet server health", "all tablet servers running"),
            Err(err) => CheckResult::failed("tablet server health", err.to_string()),
        });

        report.add(match self.check_tables_consistency() {
            Ok(()) => CheckResult::passed("table consistency", "all tables consistent"),
            Err(err) => CheckResult::failed("table consistency", err.to_string()),
        });

        let snapshot = self.require_snapshot()?;
        let checksum_result = checksum::checksum_cluster(
            Arc::clone(&self.transport),
            snapshot,
            &[],
            &[],
            options,
        )
        .await;
        report.add(match checksum_result {
            Ok(r) if r.all_match() => CheckResult::passed(
                "checksum",
                format!("{} tablet(s) verified, all replicas match", r.tablets.len()),
            ),
            Ok(r) => CheckResult::failed(
                "checksum",
                format!("{} tablet(s) failed verification", r.failing().len()),
            )
            .with_details(r.failure_summary()),
            Err(err) => CheckResult::failed("checksum", err.to_string()),
        });

        Ok(report)
    }
}
