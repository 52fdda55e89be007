//! Strata library
//!
//! Build planning for applications that mix a "pages" router, an "app"
//! router with server components, and edge functions: route discovery,
//! static analysis of route modules, per-compiler entry planning, client
//! reference and middleware manifests, and the hot update channel used by
//! the development server.

pub mod analysis;
pub mod bundler;
pub mod cache;
pub mod cli;
pub mod config;
pub mod entries;
pub mod error;
pub mod hot_reload;
pub mod manifest;
pub mod plugins;
pub mod resolver;
pub mod routes;
pub mod server;
pub mod transform;
pub mod utils;

pub use bundler::{BuildOutput, Bundler};
pub use cli::Cli;
pub use config::Config;
pub use error::{BuildError, BuildResult};
