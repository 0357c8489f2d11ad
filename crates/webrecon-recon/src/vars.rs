//! Placeholder generators for the pipeline phases.
//!
//! Generators that produce a file write a fresh, uniquely named target file
//! into the project data directory on every call and return its path.

use std::fs;
use std::sync::Arc;

use webrecon_core::targets::{unique_path, write_targets};
use webrecon_core::{RegistryError, TaskDescriptor, VariableRegistry};

use crate::project::ProjectContext;

/// Variables available to target identification tasks.
pub fn identification_variables(
    ctx: &Arc<ProjectContext>,
) -> Result<VariableRegistry, RegistryError> {
    let mut vars = VariableRegistry::new();
    bind(&mut vars, ctx, "OutFile", out_file)?;
    bind(&mut vars, ctx, "RootDomsCSV", root_doms_csv)?;
    bind(&mut vars, ctx, "RootDomsFile", root_doms_file)?;
    bind(&mut vars, ctx, "IPFile", ip_file)?;
    Ok(vars)
}

/// Variables available to flyover tasks.
pub fn flyover_variables(ctx: &Arc<ProjectContext>) -> Result<VariableRegistry, RegistryError> {
    let mut vars = VariableRegistry::new();
    bind(&mut vars, ctx, "OutFile", out_file)?;
    bind(&mut vars, ctx, "OutDir", out_dir)?;
    bind(&mut vars, ctx, "IPFile", ip_file)?;
    bind(&mut vars, ctx, "DomsFile", doms_file)?;
    bind(&mut vars, ctx, "DomsIPFile", all_targets_file)?;
    Ok(vars)
}

type Generator = fn(&ProjectContext, &mut TaskDescriptor) -> anyhow::Result<String>;

fn bind(
    vars: &mut VariableRegistry,
    ctx: &Arc<ProjectContext>,
    name: &str,
    generator: Generator,
) -> Result<(), RegistryError> {
    let ctx = Arc::clone(ctx);
    vars.register(name, move |task| generator(&ctx, task))
}

/// A fresh output path for the task, recorded on the task for callbacks.
fn out_file(ctx: &ProjectContext, task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let path = unique_path(&ctx.data_dir, &task.name);
    let rendered = path.display().to_string();
    task.output_file = Some(path);
    Ok(rendered)
}

fn root_doms_csv(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    Ok(ctx.root_domains.join(","))
}

fn root_doms_file(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let path = unique_path(&ctx.data_dir, "RootDoms");
    write_targets(&path, &ctx.root_domains)?;
    Ok(path.display().to_string())
}

fn ip_file(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let path = unique_path(&ctx.data_dir, "ip-targets");
    write_targets(&path, ctx.scope.enumerate_in_scope().iter().map(|ip| ip.to_string()))?;
    ctx.set_results_path(&path);
    Ok(path.display().to_string())
}

fn doms_file(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let path = unique_path(&ctx.data_dir, "domain-targets");
    write_targets(&path, ctx.hostnames.hostnames())?;
    ctx.set_results_path(&path);
    Ok(path.display().to_string())
}

fn all_targets_file(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let path = unique_path(&ctx.data_dir, "all-targets");
    let mut lines: Vec<String> = ctx
        .scope
        .enumerate_in_scope()
        .iter()
        .map(|ip| ip.to_string())
        .collect();
    lines.extend(ctx.hostnames.hostnames());
    write_targets(&path, lines)?;
    ctx.set_results_path(&path);
    Ok(path.display().to_string())
}

fn out_dir(ctx: &ProjectContext, _task: &mut TaskDescriptor) -> anyhow::Result<String> {
    let dir = ctx.data_dir.join("flyover");
    fs::create_dir_all(&dir)?;
    Ok(format!("{}/", dir.display()))
}
