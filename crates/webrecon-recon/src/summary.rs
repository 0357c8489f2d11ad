//! JSON summary of a pipeline run.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use webrecon_core::BatchReport;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub in_scope_targets: usize,
    pub hostnames: BTreeMap<String, Vec<IpAddr>>,
    pub targets: Vec<String>,
    /// Last target file generated for the tools.
    pub target_file: Option<PathBuf>,
    pub phases: Vec<PhaseSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub name: String,
    pub succeeded: usize,
    pub failed: usize,
    pub report: BatchReport,
}

impl PhaseSummary {
    pub fn new(name: &str, report: BatchReport) -> Self {
        Self {
            name: name.to_string(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            report,
        }
    }
}

impl RunSummary {
    pub fn phase(&self, name: &str) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Run summary written");
        Ok(())
    }
}
