use serde::Serialize;

use super::tablet::TabletInfo;

/// One table: its configured replication factor and its ordered tablets.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub schema_id: String,
    pub num_replicas: usize,
    pub tablets: Vec<TabletInfo>,
}

impl TableInfo {
    pub fn tablet(&self, id: &str) -> Option<&TabletInfo> {
        self.tablets.iter().find(|t| t.id == id)
    }

    pub fn tablet_count(&self) -> usize {
        self.tablets.len()
    }
}
