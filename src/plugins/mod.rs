//! Compilation plugins
//!
//! Plugins hook into a finished compilation: once its module graph is
//! complete (`finish_modules`) and while its assets are processed, stage by
//! stage. Manifests are produced this way.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bundler::Compilation;
use crate::config::Config;
use crate::entries::Target;
use crate::error::BuildResult;
use crate::manifest::ClientReferenceState;
use crate::routes::RouteDirs;

/// Asset processing stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessAssetsStage {
    /// Add new assets
    Additions,
    /// Last stage before hashing; sees every other asset
    OptimizeHash,
}

impl ProcessAssetsStage {
    pub const ALL: [ProcessAssetsStage; 2] = [ProcessAssetsStage::Additions, ProcessAssetsStage::OptimizeHash];
}

/// What plugins know about the build besides the compilation itself
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub config: Arc<Config>,
    pub dirs: RouteDirs,
    pub dev: bool,

    /// Server-side ids of client modules, collected from the server compilations
    pub client_references: ClientReferenceState,

    /// Every app-collection route key of the build
    pub app_pages: Vec<String>,
}

/// A compilation plugin
#[async_trait]
pub trait CompilationPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the plugin runs for a compiler
    fn applies_to(&self, _target: Target) -> bool {
        true
    }

    /// Called once the module graph is complete
    async fn finish_modules(&self, _compilation: &mut Compilation, _cx: &PluginContext) -> BuildResult<()> {
        Ok(())
    }

    /// Called once per asset processing stage
    async fn process_assets(
        &self,
        _stage: ProcessAssetsStage,
        _compilation: &mut Compilation,
        _cx: &PluginContext,
    ) -> BuildResult<()> {
        Ok(())
    }
}

/// Plugin manager
#[derive(Default, Clone)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn CompilationPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn CompilationPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Run every applicable plugin over a compilation, then rehash it
    pub async fn run(&self, compilation: &mut Compilation, cx: &PluginContext) -> BuildResult<()> {
        let target = compilation.target;
        let plugins: Vec<_> = self.plugins.iter().filter(|plugin| plugin.applies_to(target)).collect();

        for plugin in &plugins {
            debug!("{}: finish_modules ({})", plugin.name(), target);
            plugin.finish_modules(compilation, cx).await?;
        }
        for stage in ProcessAssetsStage::ALL {
            for plugin in &plugins {
                debug!("{}: process_assets {:?} ({})", plugin.name(), stage, target);
                plugin.process_assets(stage, compilation, cx).await?;
            }
        }

        compilation.update_hash();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Records the hooks it sees
    struct Recorder {
        name: &'static str,
        target: Option<Target>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CompilationPlugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn applies_to(&self, target: Target) -> bool {
            self.target.map_or(true, |only| only == target)
        }

        async fn finish_modules(&self, _compilation: &mut Compilation, _cx: &PluginContext) -> BuildResult<()> {
            self.calls.lock().push(format!("{}:finish", self.name));
            Ok(())
        }

        async fn process_assets(
            &self,
            stage: ProcessAssetsStage,
            compilation: &mut Compilation,
            _cx: &PluginContext,
        ) -> BuildResult<()> {
            self.calls.lock().push(format!("{}:{:?}", self.name, stage));
            if stage == ProcessAssetsStage::Additions {
                compilation.emit_asset(format!("{}.json", self.name), "{}");
            }
            Ok(())
        }
    }

    fn context() -> PluginContext {
        let config = Config::default_config();
        PluginContext {
            dirs: RouteDirs::from_config(&config),
            config: Arc::new(config),
            dev: false,
            client_references: ClientReferenceState::default(),
            app_pages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_for_applicable_plugins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        for (name, target) in [("a", None), ("b", Some(Target::EdgeServer)), ("c", Some(Target::Server))] {
            manager.register(Arc::new(Recorder {
                name,
                target,
                calls: calls.clone(),
            }));
        }

        let mut compilation = Compilation::new(Target::Server, false, "/project");
        manager.run(&mut compilation, &context()).await.unwrap();

        assert_eq!(
            *calls.lock(),
            vec!["a:finish", "c:finish", "a:Additions", "c:Additions", "a:OptimizeHash", "c:OptimizeHash"]
        );
        assert!(compilation.assets.contains_key("c.json"));
        assert!(!compilation.assets.contains_key("b.json"));
        assert_eq!(compilation.hash.len(), 20);
    }
}
