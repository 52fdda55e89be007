//! Development server command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::load_config;
use crate::server::DevServer;

/// Start development server with hot module replacement
#[derive(Args, Debug)]
pub struct DevCommand {
    /// Port to run the dev server on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Disable hot module replacement
    #[arg(long)]
    pub no_hmr: bool,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,
}

impl DevCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let config = load_config(config_path)?;

        let options = DevServerOptions {
            host: self.host.clone().unwrap_or_else(|| config.dev.host.clone()),
            port: self.port.unwrap_or(config.dev.port),
            hmr: config.dev.hmr && !self.no_hmr,
            out_dir: self.outdir.clone(),
        };

        let addr = format!("{}:{}", options.host, options.port);
        eprintln!(
            "{} Starting dev server at {}\n",
            "→".blue(),
            format!("http://{}", addr).cyan().underline()
        );

        if options.hmr {
            eprintln!("  {} Hot Module Replacement {}", "•".dimmed(), "enabled".green());
        }

        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        DevServer::new(config, options)?.start().await
    }
}

/// Development server options
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
    pub hmr: bool,
    /// Overrides the configured output directory
    pub out_dir: Option<PathBuf>,
}
