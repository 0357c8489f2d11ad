//! Configuration for the webrecon pipeline.

use serde::Deserialize;
use webrecon_core::dns::DEFAULT_RESOLVE_CONCURRENCY;
use webrecon_core::{SchedulerConfig, ScopeConfig, TaskSpec};

use crate::error::{ReconError, Result};

/// Top-level configuration.
///
/// Loaded from `webrecon.{toml,yaml,json}` or `WEBRECON__` environment
/// variables (e.g. `WEBRECON__GENERAL__MAX_THREADS=8`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub recon: PhaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Enable debug-level logging.
    #[serde(default)]
    pub debug: bool,

    /// Root directory for project data; each project gets a subdirectory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum concurrently running tasks in the identification phase.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Concurrent DNS lookups during hostname correlation.
    #[serde(default = "default_resolve_concurrency")]
    pub resolve_concurrency: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,

    /// Root domain names handed to subdomain enumeration tools.
    #[serde(default)]
    pub root_domains: Vec<String>,
}

/// Task lists of the two pipeline phases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseConfig {
    /// Run concurrently, bounded by `general.max_threads`.
    #[serde(default)]
    pub target_identification: Vec<TaskSpec>,

    /// Run one at a time, in order.
    #[serde(default)]
    pub flyover: Vec<TaskSpec>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_max_threads() -> usize {
    5
}

fn default_resolve_concurrency() -> usize {
    DEFAULT_RESOLVE_CONCURRENCY
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            data_dir: default_data_dir(),
            max_threads: default_max_threads(),
            resolve_concurrency: default_resolve_concurrency(),
        }
    }
}

impl ReconConfig {
    /// Load from `<file_prefix>.*` (optional) layered under the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("WEBRECON")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scope.ranges")
                    .with_list_parse_key("scope.excludes")
                    .with_list_parse_key("project.root_domains")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ReconError::Config(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| ReconError::Config(e.to_string()))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.general.max_threads)
    }
}
