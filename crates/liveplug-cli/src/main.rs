//! liveplug CLI - load, check and list live plugins

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use context::CliContext;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let ctx = CliContext::new(cli.config.as_deref(), cli.json)?;

    match cli.command {
        Commands::Load {
            project,
            untrusted,
            watch,
        } => {
            commands::load::run(&ctx, project.as_deref(), !untrusted, watch).await?;
        }

        Commands::Check { paths } => {
            commands::check::run(&ctx, &paths).await?;
        }

        Commands::List { project } => {
            commands::list::run(&ctx, project.as_deref())?;
        }

        Commands::Clean { id } => {
            commands::clean::run(&ctx, &id).await?;
        }
    }

    Ok(())
}
