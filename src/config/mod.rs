//! Configuration handling for Strata
//!
//! Parses and manages strata.toml configuration files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Route source directories
    #[serde(default)]
    pub dirs: DirsConfig,

    /// Recognised page extensions, later entries win on collisions
    #[serde(default = "default_page_extensions")]
    pub page_extensions: Vec<String>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Development server settings
    #[serde(default)]
    pub dev: DevConfig,

    /// Edge runtime settings
    #[serde(default)]
    pub edge: EdgeConfig,

    /// Rewrite rules
    #[serde(default)]
    pub rewrites: Vec<RewriteConfig>,

    /// Experimental switches
    #[serde(default)]
    pub experimental: ExperimentalConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_page_extensions() -> Vec<String> {
    ["tsx", "ts", "jsx", "js"].iter().map(|ext| ext.to_string()).collect()
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config = Self::parse(&content)?;

        // Set root directory to the directory containing the config file
        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.validate()?;

        Ok(config)
    }

    /// Parse a strata.toml document without touching the file system
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse strata.toml")
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            project: ProjectConfig {
                name: "my-app".to_string(),
                version: "0.1.0".to_string(),
            },
            dirs: DirsConfig {
                pages: Some("pages".to_string()),
                app: Some("app".to_string()),
            },
            page_extensions: default_page_extensions(),
            output: OutputConfig::default(),
            dev: DevConfig::default(),
            edge: EdgeConfig::default(),
            rewrites: Vec::new(),
            experimental: ExperimentalConfig::default(),
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.page_extensions.is_empty() {
            anyhow::bail!("`page_extensions` must list at least one extension in strata.toml");
        }

        if let Some(ext) = self.page_extensions.iter().find(|ext| ext.starts_with('.')) {
            anyhow::bail!(
                "Page extension '{}' must not start with a dot in strata.toml",
                ext
            );
        }

        for (kind, dir) in [("pages", &self.dirs.pages), ("app", &self.dirs.app)] {
            if let Some(dir) = dir {
                let full_path = self.root.join(dir);
                if !full_path.is_dir() {
                    anyhow::bail!(
                        "The {} directory points to a non-existent path: {}",
                        kind,
                        full_path.display()
                    );
                }
            }
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Absolute path of the pages directory, when configured and present
    pub fn pages_dir(&self) -> Option<PathBuf> {
        self.dirs
            .pages
            .as_ref()
            .map(|dir| self.root.join(dir))
            .filter(|dir| dir.is_dir())
    }

    /// Absolute path of the app directory, when configured and present
    pub fn app_dir(&self) -> Option<PathBuf> {
        self.dirs
            .app
            .as_ref()
            .map(|dir| self.root.join(dir))
            .filter(|dir| dir.is_dir())
    }
}
