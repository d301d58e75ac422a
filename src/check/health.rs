//! Liveness checks over an already-fetched snapshot. No network calls here;
//! the fetch pass is the only place liveness is observed.

use crate::cluster::ClusterSnapshot;
use crate::error::{CheckError, Result};

pub fn check_master_running(snapshot: &ClusterSnapshot) -> Result<()> {
    if snapshot.master.running {
        Ok(())
    } else {
        Err(CheckError::NotRunning(format!(
            "master at {}",
            snapshot.master.addr
        )))
    }
}

/// Succeeds only if every tablet server discovered by the fetch is running;
/// otherwise names each stopped server and the recorded cause.
pub fn check_tablet_servers_running(snapshot: &ClusterSnapshot) -> Result<()> {
    let stopped = snapshot.stopped_servers();
    if stopped.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = stopped
        .iter()
        .map(|s| {
            let cause = s.error.as_deref().unwrap_or("no error recorded");
            format!("{} ({}): {}", s.uuid, s.addr, cause)
        })
        .collect();
    Err(CheckError::NotRunning(format!(
        "{} of {} tablet servers not running: {}",
        stopped.len(),
        snapshot.tablet_servers.len(),
        names.join("; ")
    )))
}
