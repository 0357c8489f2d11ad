//! A reconnaissance project and its two-phase pipeline.
//!
//! 1. Reverse-resolve every in-scope address into the hostname table.
//! 2. Target identification: run the configured tools concurrently.
//! 3. Flyover: run the deeper analysis tools one at a time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use webrecon_core::{
    CommandScheduler, DnsScope, HostnameMap, Resolver, ReverseMapper, SchedulerConfig,
    ScopeResolver, TaskDescriptor, TaskSpec, TaskStatus,
};

use crate::callbacks;
use crate::config::{PhaseConfig, ReconConfig};
use crate::error::{ReconError, Result};
use crate::summary::{PhaseSummary, RunSummary};
use crate::vars;

pub const IDENTIFICATION: &str = "target_identification";
pub const FLYOVER: &str = "flyover";

/// State shared with variable generators and callbacks.
pub struct ProjectContext {
    pub name: String,
    pub data_dir: PathBuf,
    pub root_domains: Vec<String>,
    pub scope: Arc<ScopeResolver>,
    pub dns: DnsScope,
    pub hostnames: HostnameMap,
    pub resolve_concurrency: usize,
    targets: Mutex<Vec<String>>,
    results_path: Mutex<Option<PathBuf>>,
}

impl ProjectContext {
    pub fn new(
        name: &str,
        data_dir: PathBuf,
        root_domains: Vec<String>,
        scope: Arc<ScopeResolver>,
        resolver: Arc<dyn Resolver>,
        resolve_concurrency: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            data_dir,
            root_domains,
            dns: DnsScope::new(Arc::clone(&scope), resolver),
            scope,
            hostnames: HostnameMap::new(),
            resolve_concurrency: resolve_concurrency.max(1),
            targets: Mutex::new(Vec::new()),
            results_path: Mutex::new(None),
        }
    }

    /// Record a resolved in-scope hostname. Duplicates are ignored.
    pub fn add_target(&self, target: &str) {
        let mut targets = lock(&self.targets);
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }

    pub fn targets(&self) -> Vec<String> {
        lock(&self.targets).clone()
    }

    /// Most recently generated target file.
    pub fn results_path(&self) -> Option<PathBuf> {
        lock(&self.results_path).clone()
    }

    pub fn set_results_path(&self, path: &Path) {
        *lock(&self.results_path) = Some(path.to_path_buf());
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Project {
    ctx: Arc<ProjectContext>,
    resolver: Arc<dyn Resolver>,
    scheduler: SchedulerConfig,
    phases: PhaseConfig,
}

impl Project {
    /// Validate the configuration and build the project.
    ///
    /// Project data lives in `<general.data_dir>/<project.name>`.
    pub fn new(config: &ReconConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        let name = config.project.name.trim();
        if name.is_empty() {
            return Err(ReconError::Project("project requires a name".into()));
        }
        if config.general.data_dir.trim().is_empty() {
            return Err(ReconError::Project("no data directory specified".into()));
        }
        if config.scope.ranges.is_empty() {
            return Err(ReconError::Project(
                "no scope specified (scope.ranges)".into(),
            ));
        }

        let scope = Arc::new(ScopeResolver::new(&config.scope));
        let ctx = ProjectContext::new(
            name,
            Path::new(&config.general.data_dir).join(name),
            config.project.root_domains.clone(),
            scope,
            Arc::clone(&resolver),
            config.general.resolve_concurrency,
        );

        Ok(Self {
            ctx: Arc::new(ctx),
            resolver,
            scheduler: config.scheduler_config(),
            phases: config.recon.clone(),
        })
    }

    pub fn context(&self) -> &Arc<ProjectContext> {
        &self.ctx
    }

    pub fn identification_scheduler(&self) -> Result<CommandScheduler> {
        Ok(CommandScheduler::new(
            &self.scheduler,
            vars::identification_variables(&self.ctx)?,
            callbacks::callbacks(&self.ctx)?,
        ))
    }

    pub fn flyover_scheduler(&self) -> Result<CommandScheduler> {
        Ok(CommandScheduler::new(
            &self.scheduler,
            vars::flyover_variables(&self.ctx)?,
            callbacks::callbacks(&self.ctx)?,
        ))
    }

    /// Check both phases' task bindings without running anything.
    pub fn validate_tasks(&self) -> Result<()> {
        self.identification_scheduler()?
            .validate(&tasks(&self.phases.target_identification))?;
        self.flyover_scheduler()?
            .validate(&tasks(&self.phases.flyover))?;
        Ok(())
    }

    /// Seed the hostname table from every in-scope address.
    pub async fn map_hostnames(&self) {
        let addresses = self.ctx.scope.in_scope_addresses();
        tracing::info!(addresses = addresses.len(), "Mapping in-scope hostnames");
        ReverseMapper::new(Arc::clone(&self.resolver))
            .with_concurrency(self.ctx.resolve_concurrency)
            .map_hostnames(addresses, &self.ctx.hostnames)
            .await;
    }

    /// Run the full pipeline and write `summary.json` into the data dir.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        std::fs::create_dir_all(&self.ctx.data_dir)?;

        tracing::info!(
            project = %self.ctx.name,
            data_dir = %self.ctx.data_dir.display(),
            "Starting recon"
        );

        self.validate_tasks()?;
        self.map_hostnames().await;

        let identification = self
            .identification_scheduler()?
            .run_bounded(tasks(&self.phases.target_identification))
            .await?;
        log_failures(IDENTIFICATION, &identification.tasks);

        let flyover = self
            .flyover_scheduler()?
            .run_sequential(tasks(&self.phases.flyover))
            .await?;
        log_failures(FLYOVER, &flyover.tasks);

        let summary = RunSummary {
            project: self.ctx.name.clone(),
            started_at,
            finished_at: Utc::now(),
            in_scope_targets: self.ctx.scope.enumerate_in_scope().len(),
            hostnames: self
                .ctx
                .hostnames
                .snapshot()
                .into_iter()
                .map(|(host, ips)| (host, ips.into_iter().collect()))
                .collect(),
            targets: self.ctx.targets(),
            target_file: self.ctx.results_path(),
            phases: vec![
                PhaseSummary::new(IDENTIFICATION, identification),
                PhaseSummary::new(FLYOVER, flyover),
            ],
        };
        summary.write(&self.ctx.data_dir.join("summary.json"))?;

        tracing::info!(
            project = %summary.project,
            hostnames = summary.hostnames.len(),
            targets = summary.targets.len(),
            "Recon complete"
        );
        Ok(summary)
    }
}

fn tasks(specs: &[TaskSpec]) -> Vec<TaskDescriptor> {
    specs.iter().map(TaskDescriptor::from).collect()
}

fn log_failures(phase: &str, tasks: &[TaskDescriptor]) {
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Error) {
        tracing::warn!(
            phase,
            task = %task.name,
            output = %task.output.trim_end(),
            "Task failed"
        );
    }
}
