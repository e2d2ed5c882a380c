//! `liveplug load` command implementation

use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use liveplug_kernel::plugin::ContextId;
use liveplug_plugins::WatchConfig;
use liveplug_runtime::HostContext;

use crate::context::CliContext;
use crate::output::print_report;

/// Execute the `liveplug load` command
pub async fn run(
    ctx: &CliContext,
    project: Option<&Path>,
    trusted: bool,
    watch: bool,
) -> anyhow::Result<()> {
    let runtime = &ctx.runtime;
    let mut failed = 0;

    let global = runtime.on_process_started().await?;
    print_report("Global plugins", &global, ctx.json)?;
    failed += global.failed().count();

    let project_context = match project {
        Some(path) => {
            let base = path
                .canonicalize()
                .with_context(|| format!("Project {} does not exist", path.display()))?;
            if let Some(handle) = runtime.on_opened(HostContext::project(&base, trusted)).await? {
                let summary = handle.await?;
                print_report("Bundled plugins", &summary.bundled, ctx.json)?;
                if let Some(report) = &summary.project {
                    print_report("Project plugins", report, ctx.json)?;
                }
                failed += summary.failed();
            }
            Some(ContextId::project(base))
        }
        None => None,
    };

    if watch {
        let extra: Vec<PathBuf> = project_context
            .as_ref()
            .and_then(ContextId::project_path)
            .map(|base| ctx.config.project_plugins_dir(base))
            .into_iter()
            .collect();
        let mut watcher = runtime.watch_deletions(&extra, WatchConfig::default())?;
        println!(
            "{} Watching for deleted plugins, press Ctrl-C to stop",
            "→".green()
        );
        tokio::signal::ctrl_c().await?;
        watcher.stop().await;
    }

    if let Some(context) = &project_context {
        runtime.on_closing(context).await;
    }
    let roots = runtime.manager().roots();
    let global_plugins = roots.discover(roots.global_root());
    runtime
        .manager()
        .unload_plugins(&global_plugins, &ContextId::Process)
        .await;

    if failed > 0 {
        anyhow::bail!("{failed} plugins failed to load");
    }
    Ok(())
}
