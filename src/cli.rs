use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mine completed pull request discussions for reusable insights
#[derive(Parser, Debug, Clone)]
#[command(name = "pr-digest", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: pr-digest.toml, optional)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Only consider pull requests completed within this many days
    #[arg(long, global = true)]
    pub days_back: Option<u32>,

    /// Maximum number of pull requests to fetch per run
    #[arg(long, global = true)]
    pub max_prs: Option<u32>,

    /// Markdown file the digest is appended to
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Serve the digest over HTTP and run on demand
    Serve {
        /// Port to listen on (default: $PORT or 5000)
        #[arg(long)]
        port: Option<u16>,

        /// Bind all interfaces and run until interrupted (default: $PR_DIGEST_HOSTED)
        #[arg(long)]
        hosted: bool,
    },

    /// Run a single batch and exit
    Run,
}
