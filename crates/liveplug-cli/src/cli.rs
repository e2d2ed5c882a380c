//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// liveplug - run live Rhai plugins without restarting the host
#[derive(Parser)]
#[command(name = "liveplug")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "LIVEPLUG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load the global plugins, plus the plugins of a project
    Load {
        /// Project directory whose `.spp/plugins` should be loaded
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Treat the project as untrusted (only bundled plugins run)
        #[arg(long)]
        untrusted: bool,

        /// Keep running and unload plugins whose directories get deleted
        #[arg(short, long)]
        watch: bool,
    },

    /// Resolve and compile plugins without running them
    Check {
        /// Plugin directories or files inside them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List discovered plugins
    List {
        /// Also list the plugins of this project
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Delete the compile output of a plugin
    Clean {
        /// Plugin id
        id: String,
    },
}
