//! `liveplug check` command implementation

use std::collections::HashSet;
use std::path::PathBuf;

use liveplug_kernel::plugin::ContextId;
use liveplug_plugins::LivePlugin;

use crate::context::CliContext;
use crate::output::print_report;

/// Execute the `liveplug check` command
pub async fn run(ctx: &CliContext, paths: &[PathBuf]) -> anyhow::Result<()> {
    let roots = ctx.manager().roots();
    let mut seen = HashSet::new();
    let mut plugins = Vec::new();

    for path in paths {
        let path = std::path::absolute(path)?;
        // Directories outside the plugin roots are checked as they are.
        let plugin = roots
            .resolve_from_files(std::slice::from_ref(&path))
            .pop()
            .unwrap_or_else(|| LivePlugin::new(&path));
        if seen.insert(plugin.path().to_path_buf()) {
            plugins.push(plugin);
        }
    }

    let report = ctx.manager().check_plugins(plugins, &ContextId::Process).await;
    print_report("Checked plugins", &report, ctx.json)?;

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{} of {} plugins failed the check", failed, report.len());
    }
    Ok(())
}
