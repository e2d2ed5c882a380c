//! `liveplug list` command implementation

use std::path::Path;

use colored::Colorize;
use liveplug_plugins::{LivePlugin, PLUGIN_SCRIPT, TEST_SCRIPT};
use serde::Serialize;

use crate::context::CliContext;

/// Execute the `liveplug list` command
pub fn run(ctx: &CliContext, project: Option<&Path>) -> anyhow::Result<()> {
    let roots = ctx.manager().roots();
    let mut sections = vec![("global", roots.global_root().to_path_buf())];
    if let Some(project) = project {
        sections.push(("project", ctx.config.project_plugins_dir(project)));
    }

    let mut rows = Vec::new();
    for (location, root) in &sections {
        let mut plugins = roots.discover(root);
        plugins.sort_by(|a, b| a.id().cmp(b.id()));
        rows.extend(plugins.iter().map(|plugin| PluginRow::new(location, plugin)));
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{} Listing live plugins", "→".green());
    for (_, root) in &sections {
        println!("  {}", root.display().to_string().cyan());
    }
    println!();

    if rows.is_empty() {
        println!("  No plugins found.");
        return Ok(());
    }
    for row in &rows {
        let entry = row.entry.as_deref().unwrap_or("no entry script");
        println!(
            "  {:<24} {:<8} {:<18} {} files",
            row.id.bold(),
            row.location,
            entry.yellow(),
            row.files
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct PluginRow {
    id: String,
    location: String,
    path: String,
    entry: Option<String>,
    files: usize,
}

impl PluginRow {
    fn new(location: &str, plugin: &LivePlugin) -> Self {
        let entry = [PLUGIN_SCRIPT, TEST_SCRIPT]
            .into_iter()
            .find(|name| plugin.entry_script(name).is_some())
            .map(str::to_string);
        Self {
            id: plugin.id().to_string(),
            location: location.to_string(),
            path: plugin.path().display().to_string(),
            entry,
            files: plugin.all_files().len(),
        }
    }
}
