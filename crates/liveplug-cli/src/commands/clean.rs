//! `liveplug clean` command implementation

use colored::Colorize;

use crate::context::CliContext;

/// Execute the `liveplug clean` command
pub async fn run(ctx: &CliContext, id: &str) -> anyhow::Result<()> {
    if ctx.manager().delete_compiled(id).await {
        println!("{} Deleted compile output of '{}'", "✓".green(), id);
    } else {
        println!("  No compile output for '{}'", id);
    }
    Ok(())
}
