//! Printing batch results

use colored::Colorize;
use liveplug_plugins::BatchReport;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct OutcomeRow<'a> {
    plugin: &'a str,
    ok: bool,
    error: Option<String>,
    millis: u128,
}

/// Prints one line per plugin, or a JSON array.
pub fn print_report(title: &str, report: &BatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<OutcomeRow> = report
            .outcomes
            .iter()
            .map(|o| OutcomeRow {
                plugin: &o.plugin_id,
                ok: o.is_success(),
                error: o.result.as_ref().err().map(|e| e.to_string()),
                millis: o.duration.as_millis(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{} {}", "→".green(), title.bold());
    if report.is_empty() {
        println!("  No plugins found.");
        return Ok(());
    }
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => println!(
                "  {} {} {}",
                "✓".green(),
                outcome.plugin_id,
                format!("({} ms)", outcome.duration.as_millis()).dimmed()
            ),
            Err(e) => {
                println!("  {} {} [{}]", "✗".red(), outcome.plugin_id, e.kind());
                for line in e.to_string().lines() {
                    println!("      {}", line.red());
                }
            }
        }
    }
    Ok(())
}
