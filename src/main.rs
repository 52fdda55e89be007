//! Strata - entry planning and manifests for layered web application builds
//!
//! # Features
//! - Route discovery for "pages", "app" and root collections
//! - Static export analysis driving runtime and layer selection
//! - Client, server and edge entry planning
//! - Client reference and middleware manifests
//! - Dev server with WebSocket-based hot updates

use clap::Parser;
use colored::Colorize;
use strata_lib::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("strata_lib=debug,strata=debug,tower_http=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata_lib=info,strata=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = cli.execute().await {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
