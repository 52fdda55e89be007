//! Command-line interface for Strata
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Plan entries, compile and write manifests
//! - `dev`: Development server with HMR

mod build;
mod dev;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crate::config::Config;

pub use build::BuildCommand;
pub use dev::{DevCommand, DevServerOptions};

/// Strata - route discovery, entry planning and client reference manifests
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to strata.toml config file
    #[arg(short, long, global = true, default_value = "strata.toml", env = "STRATA_CONFIG")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build(BuildCommand),

    /// Start development server with hot module replacement
    Dev(DevCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Dev(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Load `strata.toml`, falling back to defaults rooted next to the missing
/// file
pub fn load_config(config_path: &str) -> Result<Config> {
    let path = Path::new(config_path);
    if path.exists() {
        info!("Loading configuration from {}", config_path);
        return Config::load(path);
    }

    info!("No {} found, using defaults", config_path);
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let mut config = Config::default_config();
    config.root = root;
    Ok(config)
}

/// Print the Strata banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "◆".cyan(),
        "Strata".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
