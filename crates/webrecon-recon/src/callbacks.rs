//! Task completion callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Semaphore;
use webrecon_core::targets::{clean_unique, read_targets};
use webrecon_core::{CallbackRegistry, RegistryError, TaskDescriptor};

use crate::project::ProjectContext;

/// Callbacks shared by both pipeline phases.
pub fn callbacks(ctx: &Arc<ProjectContext>) -> Result<CallbackRegistry, RegistryError> {
    let mut registry = CallbackRegistry::new();

    let domains_ctx = Arc::clone(ctx);
    registry.register("domains", move |task| {
        let ctx = Arc::clone(&domains_ctx);
        async move { domains(ctx, task).await }
    })?;

    registry.register("print", |task| async move {
        print_output(&task);
        Ok(())
    })?;

    Ok(registry)
}

/// Read hostnames from the task's output file and keep those resolving
/// into scope as targets.
async fn domains(ctx: Arc<ProjectContext>, task: TaskDescriptor) -> anyhow::Result<()> {
    let path = task
        .output_file
        .as_ref()
        .with_context(|| format!("task '{}' has no output file", task.name))?;
    let names = clean_unique(
        read_targets(path).with_context(|| format!("reading {}", path.display()))?,
    );

    let permits = u32::try_from(ctx.resolve_concurrency.max(1)).unwrap_or(u32::MAX);
    let semaphore = Arc::new(Semaphore::new(permits as usize));
    let found = Arc::new(AtomicUsize::new(0));

    for name in names {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .context("resolver pool closed")?;
        let ctx = Arc::clone(&ctx);
        let found = Arc::clone(&found);
        tokio::spawn(async move {
            let _permit = permit;
            let (in_scope, ips) = ctx.dns.check_domain(&name).await;
            if in_scope {
                ctx.add_target(&name);
                ctx.hostnames.extend(&name, ips);
                found.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    // Each lookup releases its permit when done.
    semaphore
        .acquire_many(permits)
        .await
        .context("resolver pool closed")?;
    let found = found.load(Ordering::Relaxed);

    tracing::info!(task = %task.name, in_scope = found, "Correlated discovered domains");
    Ok(())
}

fn print_output(task: &TaskDescriptor) {
    tracing::info!(
        task = %task.name,
        status = %task.status,
        output = %task.output.trim_end(),
        "Task output"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::context;

    #[tokio::test]
    async fn test_domains_records_in_scope_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let out = dir.path().join("subfinder-out");
        std::fs::write(
            &out,
            "www.test.com\nnull\n\nexternal.test.com\nwww.test.com\nmissing.test.com\n",
        )
        .unwrap();

        let mut task = TaskDescriptor::new("subfinder", "true");
        task.output_file = Some(out);
        domains(ctx.clone(), task).await.unwrap();

        assert_eq!(ctx.targets(), vec!["www.test.com"]);
        assert_eq!(ctx.hostnames.hostnames(), vec!["www.test.com"]);
        assert_eq!(
            ctx.hostnames.addresses("www.test.com"),
            ["10.0.0.2".parse().unwrap()].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_domains_without_output_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let err = domains(ctx, TaskDescriptor::new("subfinder", "true"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no output file"));
    }

    #[tokio::test]
    async fn test_domains_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut task = TaskDescriptor::new("subfinder", "true");
        task.output_file = Some(dir.path().join("never-written"));
        assert!(domains(ctx, task).await.is_err());
    }

    #[test]
    fn test_registry_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = callbacks(&context(dir.path())).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["domains", "print"]);
    }
}
