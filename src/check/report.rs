use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Passed => write!(f, "passed"),
            CheckStatus::Failed => write!(f, "failed"),
            CheckStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl CheckResult {
    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Passed,
            message: message.into(),
            details: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Failed,
            message: message.into(),
            details: None,
        }
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Skipped,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// The merged outcome of one verification pass: health, consistency and
/// checksum results in one place, each failure attributable to a specific
/// table, tablet or server through its message and details.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub generated_at: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
}

impl ClusterReport {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            checks: Vec::new(),
        }
    }

    pub fn add(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Passed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .count()
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .collect()
    }
}

impl Default for ClusterReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_passes() {
        let report = ClusterReport::new();
        assert!(report.all_passed());
        assert_eq!(report.passed_count(), 0);
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn test_mixed_report() {
        let mut report = ClusterReport::new();
        report.add(CheckResult::passed("master health", "running"));
        report.add(
            CheckResult::failed("table consistency", "1 tablet inconsistent")
                .with_details("table t tablet tab-0: no elected leader"),
        );
        report.add(CheckResult::skipped("checksum", "metadata not fetched"));

        assert!(!report.all_passed());
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].name, "table consistency");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(CheckStatus::Passed.to_string(), "passed");
        assert_eq!(CheckStatus::Failed.to_string(), "failed");
        assert_eq!(CheckStatus::Skipped.to_string(), "skipped");
    }
}
