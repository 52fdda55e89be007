//! Build command implementation

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::{info, warn};

use super::load_config;
use crate::bundler::Bundler;
use crate::manifest::sorted_routes;
use crate::utils::{format_duration, normalize_app_path};

/// Build the project
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Build with development settings
    #[arg(long)]
    pub dev: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let config = load_config(config_path)?;
        let out_dir = self.outdir.clone().unwrap_or_else(|| config.output_dir());

        eprintln!(
            "{} Building {} {}...",
            "→".blue(),
            config.project.name.bold(),
            format!("v{}", config.project.version).dimmed()
        );

        let output = Bundler::new(config, self.dev).build().await?;

        for warning in output.warnings() {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        for record in output.telemetry() {
            info!("telemetry {}: {}", record.event_name, record.payload);
        }

        let errors: Vec<String> = output.errors().map(|err| err.to_string()).collect();
        if !errors.is_empty() {
            eprintln!("\n{} Failed to compile\n", "✗".red().bold());
            for error in &errors {
                eprintln!("{}\n", error);
            }
            anyhow::bail!("Build failed with {} error(s)", errors.len());
        }

        let written = output.write(&out_dir).await?;

        eprintln!(
            "\n{} Built {} route(s), wrote {} file(s) in {}\n",
            "✓".green().bold(),
            output.routes.len(),
            written,
            format_duration(output.duration)
        );

        // Route summary, most specific first
        let routes = &output.routes;
        let collections: [(&str, BTreeSet<String>); 2] = [
            ("pages", routes.pages.iter().flat_map(|pages| pages.keys().cloned()).collect()),
            (
                "app",
                routes
                    .app
                    .iter()
                    .flat_map(|app| app.keys())
                    .map(|page| normalize_app_path(page))
                    .collect(),
            ),
        ];
        for (collection, urls) in collections {
            if urls.is_empty() {
                continue;
            }
            eprintln!("  {}", collection.bold());
            match sorted_routes(&urls) {
                Ok(sorted) => {
                    for url in sorted {
                        eprintln!("  {} {}", "•".dimmed(), url.cyan());
                    }
                }
                Err(err) => warn!("{}", err),
            }
        }

        eprintln!();

        Ok(())
    }
}
