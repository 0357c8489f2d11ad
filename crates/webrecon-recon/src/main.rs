//! CLI entry point for the webrecon pipeline.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use webrecon_core::SystemResolver;
use webrecon_recon::config::ReconConfig;
use webrecon_recon::project::Project;

#[derive(Parser)]
#[command(name = "webrecon")]
#[command(about = "Scope-aware reconnaissance pipeline")]
struct Cli {
    /// Config file prefix (default: webrecon).
    #[arg(short, long, default_value = "webrecon")]
    config: String,

    /// Override the project name.
    #[arg(short, long)]
    name: Option<String>,

    /// Override the root data directory.
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the identification concurrency limit.
    #[arg(long)]
    max_threads: Option<usize>,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,

    /// Validate the configuration and task bindings, then exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut recon_config = ReconConfig::load(&cli.config)?;
    if let Some(name) = cli.name {
        recon_config.project.name = name;
    }
    if let Some(data_dir) = cli.data_dir {
        recon_config.general.data_dir = data_dir;
    }
    if let Some(max_threads) = cli.max_threads {
        recon_config.general.max_threads = max_threads;
    }

    let level = if recon_config.general.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let project = Project::new(&recon_config, Arc::new(SystemResolver))?;

    if cli.dry_run {
        project.validate_tasks()?;
        tracing::info!(
            project = %project.context().name,
            in_scope = project.context().scope.enumerate_in_scope().len(),
            identification = recon_config.recon.target_identification.len(),
            flyover = recon_config.recon.flyover.len(),
            "Configuration valid"
        );
        return Ok(());
    }

    let summary = project.run().await?;
    for phase in &summary.phases {
        tracing::info!(
            phase = %phase.name,
            succeeded = phase.succeeded,
            failed = phase.failed,
            "Phase finished"
        );
    }
    Ok(())
}
