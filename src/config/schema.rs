//! Configuration schema definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Source directories, relative to the project root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirsConfig {
    /// Directory holding "pages"-style routes
    #[serde(default)]
    pub pages: Option<String>,

    /// Directory holding "app"-style routes
    #[serde(default)]
    pub app: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Public URL prefix for emitted chunks
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// `crossorigin` attribute for chunk loading (`anonymous` or `use-credentials`)
    #[serde(default)]
    pub cross_origin: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            public_path: default_public_path(),
            cross_origin: None,
        }
    }
}

fn default_output_dir() -> String {
    ".strata".to_string()
}

fn default_public_path() -> String {
    "/_strata/".to_string()
}

fn default_true() -> bool {
    true
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Port to run dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Enable hot module replacement
    #[serde(default = "default_true")]
    pub hmr: bool,

    /// Debounce window for file-system events, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            hmr: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

/// A rewrite rule; only interception rewrites reach the edge runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteConfig {
    pub source: String,
    pub destination: String,
}

/// Edge runtime settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Environment variables exposed to edge functions
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Experimental switches forwarded to loaders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentalConfig {
    /// Partial prerendering
    #[serde(default)]
    pub ppr: bool,

    /// Subresource integrity algorithm (e.g. `sha256`)
    #[serde(default)]
    pub sri: Option<String>,
}
