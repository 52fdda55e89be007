//! Core bundler implementation
//!
//! Plans entries from the discovered routes, runs the server and edge
//! compilers, injects browser entries for the client components they found,
//! runs the client compiler and finally lets plugins emit manifests.

mod build_info;
mod chunk;
mod compilation;
mod engine;
mod graph;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analysis::StaticInfoExtractor;
use crate::cache::IncrementalCache;
use crate::config::Config;
use crate::entries::{EntryBuilder, Entrypoints, Target};
use crate::error::BuildError;
use crate::manifest::{flight_client_entries, ClientReferenceManifestPlugin, ClientReferenceState, MiddlewarePlugin};
use crate::plugins::{CompilationPlugin, PluginContext, PluginManager};
use crate::routes::{DiscoveredRoutes, RouteDirs, RouteDiscoverer};
use crate::utils::normalize_app_path;

pub use build_info::{BuildInfo, BuildInfoTable, EdgeMeta, RouteMeta, RscMeta};
pub use chunk::{Chunk, ChunkGraph, ChunkGroup, ChunkGroupId, ChunkGroupWalk, ChunkId};
pub use compilation::{Compilation, CompiledEntry, TelemetryRecord, TELEMETRY_TARGET};
pub use engine::{BuildEngine, CompileContext, EntryOnlyEngine};
pub use graph::{Connection, Module, ModuleGraph, ModuleId, RuntimeId};

/// Everything one build produced
#[derive(Debug)]
pub struct BuildOutput {
    pub routes: DiscoveredRoutes,
    pub entrypoints: Entrypoints,
    /// Client, server and edge compilations, in that order
    pub compilations: Vec<Compilation>,
    /// Combined hash of every compilation
    pub hash: String,
    pub duration: Duration,
}

impl BuildOutput {
    pub fn compilation(&self, target: Target) -> Option<&Compilation> {
        self.compilations.iter().find(|c| c.target == target)
    }

    /// Route failures followed by compilation errors
    pub fn errors(&self) -> impl Iterator<Item = &BuildError> {
        self.entrypoints
            .failures
            .iter()
            .map(|failure| &failure.error)
            .chain(self.compilations.iter().flat_map(|c| c.errors.iter()))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &BuildError> {
        self.compilations.iter().flat_map(|c| c.warnings.iter())
    }

    pub fn telemetry(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.compilations.iter().flat_map(|c| c.telemetry.iter())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Write every asset. Client assets go to `out_dir`, server and edge
    /// assets to `out_dir/server`.
    pub async fn write(&self, out_dir: &Path) -> Result<usize> {
        let mut written = 0;
        for compilation in &self.compilations {
            let base = match compilation.target {
                Target::Client => out_dir.to_path_buf(),
                Target::Server | Target::EdgeServer => out_dir.join("server"),
            };
            for (name, source) in &compilation.assets {
                let path = base.join(name);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create directory {}", parent.display()))?;
                }
                tokio::fs::write(&path, source)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written += 1;
            }
        }

        let entrypoints = serde_json::to_string_pretty(&self.entrypoints)?;
        let path = out_dir.join("entrypoints.json");
        tokio::fs::write(&path, entrypoints)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Wrote {} assets to {}", written, out_dir.display());
        Ok(written + 1)
    }
}

/// The main bundler
#[derive(Clone)]
pub struct Bundler {
    config: Arc<Config>,
    dirs: RouteDirs,
    dev: bool,
    extractor: StaticInfoExtractor,
    engine: Arc<dyn BuildEngine>,
    plugins: PluginManager,
}

impl Bundler {
    /// Create a bundler with the built-in engine and manifest plugins
    pub fn new(config: Config, dev: bool) -> Self {
        let dirs = RouteDirs::from_config(&config);
        let mut plugins = PluginManager::new();
        plugins.register(Arc::new(ClientReferenceManifestPlugin));
        plugins.register(Arc::new(MiddlewarePlugin));

        Self {
            config: Arc::new(config),
            dirs,
            dev,
            extractor: StaticInfoExtractor::new(),
            engine: Arc::new(EntryOnlyEngine::default()),
            plugins,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn BuildEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Cache static info extraction across builds
    pub fn with_cache(mut self, cache: Arc<dyn IncrementalCache>) -> Self {
        self.extractor = StaticInfoExtractor::with_cache(cache);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn CompilationPlugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dirs(&self) -> &RouteDirs {
        &self.dirs
    }

    pub fn discoverer(&self) -> RouteDiscoverer {
        RouteDiscoverer::new(self.dirs.clone(), self.config.page_extensions.clone(), self.dev)
    }

    /// Discover routes and build them
    pub async fn build(&self) -> Result<BuildOutput> {
        let routes = self.discoverer().discover().await?;
        self.build_routes(routes).await
    }

    /// Build already discovered routes
    pub async fn build_routes(&self, routes: DiscoveredRoutes) -> Result<BuildOutput> {
        let start = Instant::now();
        let has_app_dir = self.dirs.app_dir.is_some();

        info!("Creating entrypoints...");
        let mut entrypoints = EntryBuilder::new(&self.config, &self.dirs, &self.extractor, self.dev)
            .create_entrypoints(&routes)
            .await?;
        for failure in &entrypoints.failures {
            warn!("Skipping {}: {}", failure.page, failure.error);
        }

        let ctx = CompileContext {
            dirs: self.dirs.clone(),
            page_extensions: self.config.page_extensions.clone(),
            dev: self.dev,
        };

        info!("Compiling server and edge ({})...", self.engine.name());
        let server_entries = entrypoints.finalized(Target::Server.as_str(), has_app_dir)?;
        let edge_entries = entrypoints.finalized(Target::EdgeServer.as_str(), has_app_dir)?;
        let (mut server, mut edge) = tokio::try_join!(
            self.engine.compile(Target::Server, &server_entries, &ctx),
            self.engine.compile(Target::EdgeServer, &edge_entries, &ctx),
        )?;

        let mut client_references = ClientReferenceState::default();
        client_references.record(&server);
        client_references.record(&edge);

        if let Some(app_dir) = &self.dirs.app_dir {
            let injected = flight_client_entries([&server, &edge], app_dir);
            debug!("Injecting {} client component entries", injected.len());
            for (name, entry) in injected {
                entrypoints.client.entry(name).or_insert(entry);
            }
        }

        info!("Compiling client...");
        let client_entries = entrypoints.finalized(Target::Client.as_str(), has_app_dir)?;
        let mut client = self.engine.compile(Target::Client, &client_entries, &ctx).await?;

        let app_pages: BTreeSet<String> = routes
            .app
            .iter()
            .flat_map(|app| app.keys())
            .map(|page| normalize_app_path(page))
            .collect();
        let cx = PluginContext {
            config: self.config.clone(),
            dirs: self.dirs.clone(),
            dev: self.dev,
            client_references,
            app_pages: app_pages.into_iter().collect(),
        };
        for compilation in [&mut client, &mut server, &mut edge] {
            self.plugins
                .run(compilation, &cx)
                .await
                .with_context(|| format!("Plugins failed for the {} compiler", compilation.target))?;
        }

        let mut hasher = Sha256::new();
        for compilation in [&client, &server, &edge] {
            hasher.update(compilation.hash.as_bytes());
        }
        let output = BuildOutput {
            routes,
            entrypoints,
            compilations: vec![client, server, edge],
            hash: hex::encode(hasher.finalize())[..20].to_string(),
            duration: start.elapsed(),
        };

        info!(
            "Build {} finished with {} errors and {} warnings",
            output.hash,
            output.errors().count(),
            output.warnings().count()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let write = |path: &str, content: &str| {
            let file = dir.path().join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        };
        write("app/layout.tsx", "export default function Layout({ children }) { return children }\n");
        write(
            "app/page.tsx",
            "import { Counter } from './counter';\nexport default function Page() { return <Counter /> }\n",
        );
        write(
            "app/counter.tsx",
            "'use client';\nexport function Counter() { return null }\n",
        );
        write("pages/about.tsx", "export default function About() { return null }\n");
        dir
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default_config();
        config.root = root.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_build_emits_client_reference_manifest() {
        let dir = project();
        let output = Bundler::new(config(dir.path()), false).build().await.unwrap();
        assert!(!output.has_errors(), "{:?}", output.errors().collect::<Vec<_>>());

        assert!(output.entrypoints.client.contains_key("app/page"));
        assert!(output.entrypoints.client.contains_key("pages/about"));

        let client = output.compilation(Target::Client).unwrap();
        let manifest = &client.assets["server/app/page_client-reference-manifest.js"];
        assert!(manifest.contains("counter.tsx"), "{}", manifest);

        let edge = output.compilation(Target::EdgeServer).unwrap();
        assert!(edge.assets.contains_key("middleware-manifest.json"));
        assert_eq!(output.hash.len(), 20);
    }

    #[tokio::test]
    async fn test_write_splits_client_and_server_assets() {
        let dir = project();
        let output = Bundler::new(config(dir.path()), true).build().await.unwrap();
        let out = dir.path().join(".strata");
        output.write(&out).await.unwrap();

        assert!(out.join("entrypoints.json").is_file());
        assert!(out.join("server/app/page_client-reference-manifest.js").is_file());
        assert!(out.join("server/middleware-manifest.json").is_file());
        assert!(out.join("static/chunks/app/page.js").is_file());
    }
}
