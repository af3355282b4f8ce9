use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pr_digest::classifier::ChatClassifier;
use pr_digest::cli::{Cli, CliCommand};
use pr_digest::config::Config;
use pr_digest::orchestrator::Orchestrator;
use pr_digest::progress::ProgressTracker;
use pr_digest::server::{self, AppState};
use pr_digest::sources::azure_devops::AzureDevOpsSource;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("pr-digest starting");

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        base_url = %config.base_url,
        project = %config.project,
        repository = %config.repository,
        days_back = config.days_back,
        max_prs = config.max_prs,
        "config loaded"
    );

    let source = Arc::new(AzureDevOpsSource::new(&config));
    let classifier = ChatClassifier::new(&config.classifier);
    let progress = Arc::new(ProgressTracker::new());
    let orchestrator = Orchestrator::from_config(&config, source, classifier, progress);

    match cli.command {
        CliCommand::Run => {
            if let Err(e) = orchestrator.run(config.days_back, config.max_prs).await {
                error!(error = %e, "run failed");
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        CliCommand::Serve { .. } => {
            let state = Arc::new(AppState::new(&config, orchestrator));
            if let Err(e) = server::serve(state, config.port, config.hosted).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}
