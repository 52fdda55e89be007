//! Edge module contexts kept across rebuilds
//!
//! Each edge entry evaluates in its own context. A context is dropped as
//! soon as any file it evaluated changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::bundler::Compilation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleContext {
    /// Files evaluated inside the context
    pub paths: BTreeSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ModuleContextCache {
    contexts: DashMap<String, ModuleContext>,
}

impl ModuleContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, context: ModuleContext) {
        self.contexts.insert(name.into(), context);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Register a context for every entry of an edge compilation. Existing
    /// contexts are kept.
    pub fn record(&self, compilation: &Compilation) {
        for (name, entry) in &compilation.entries {
            if self.contains(name) {
                continue;
            }
            let paths = entry
                .modules
                .iter()
                .flat_map(|&start| compilation.graph.reachable(start))
                .filter_map(|id| compilation.graph.module(id))
                .filter_map(|module| module.resource.clone())
                .collect();
            self.insert(name.clone(), ModuleContext { paths });
        }
    }

    /// Drop every context that evaluated `path`, returning their names
    pub fn invalidate(&self, path: &Path) -> Vec<String> {
        let stale: Vec<String> = self
            .contexts
            .iter()
            .filter(|context| context.paths.contains(path))
            .map(|context| context.key().clone())
            .collect();
        for name in &stale {
            self.contexts.remove(name);
            debug!("Cleared module context {}", name);
        }
        stale
    }

    pub fn invalidate_all(&self) {
        self.contexts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(paths: &[&str]) -> ModuleContext {
        ModuleContext {
            paths: paths.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_invalidate_drops_dependents_only() {
        let cache = ModuleContextCache::new();
        cache.insert("middleware", context(&["/p/middleware.ts", "/p/lib/auth.ts"]));
        cache.insert("pages/api/edge", context(&["/p/pages/api/edge.ts"]));

        let mut removed = cache.invalidate(Path::new("/p/lib/auth.ts"));
        removed.sort();
        assert_eq!(removed, vec!["middleware".to_string()]);
        assert!(!cache.contains("middleware"));
        assert!(cache.contains("pages/api/edge"));

        assert!(cache.invalidate(Path::new("/p/unrelated.ts")).is_empty());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
