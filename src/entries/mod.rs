//! Compilation entries
//!
//! Turns discovered routes into per-compiler entry descriptors: which
//! virtual module each route is built from, in which layer, and which
//! runtime chunk it depends on.

mod builder;
mod classify;
mod finalize;
mod layer;
mod loader;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::analysis::MiddlewareMatcher;
use crate::error::{BuildError, BuildResult};
use crate::routes::RouteCollection;

pub use builder::{EntryBuilder, RouteFailure};
pub use classify::{classify, Target, Targets};
pub use finalize::{
    finalize_entrypoint, runtime_entries, APP_CLIENT_INTERNALS, CLIENT_RUNTIME_MAIN, CLIENT_RUNTIME_MAIN_APP,
    CLIENT_RUNTIME_POLYFILLS, CLIENT_RUNTIME_REACT_REFRESH, EDGE_RUNTIME, SERVER_API_RUNTIME, SERVER_RUNTIME,
};
pub use layer::Layer;
pub use loader::{
    AppLoaderOptions, ClientModuleRequest, ClientPagesLoaderOptions, EdgeAppRouteLoaderOptions,
    EdgeFunctionLoaderOptions, EdgeSsrLoaderOptions, EntryImport, FlightClientEntryLoaderOptions, LoaderOptions,
    MiddlewareLoaderOptions, RouteKind, RouteLoaderOptions, SpecialPages, FLIGHT_CLIENT_ENTRY_LOADER,
    LOADER_OPTIONS_VERSION,
};

/// Library binding of an edge entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryLibrary {
    pub name: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One entry of one compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescriptor {
    /// Bundle name, e.g. `pages/blog/[slug]` or `app/dashboard/page`
    pub name: String,

    /// Route the entry was created for
    pub page: String,

    pub collection: RouteCollection,

    pub import: Vec<EntryImport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub depend_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<EntryLibrary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_chunks: Option<bool>,

    #[serde(skip)]
    pub is_server_component: bool,
}

impl EntryDescriptor {
    pub fn new(name: impl Into<String>, page: impl Into<String>, collection: RouteCollection, import: Vec<EntryImport>) -> Self {
        Self {
            name: name.into(),
            page: page.into(),
            collection,
            import,
            layer: None,
            filename: None,
            depend_on: None,
            runtime: None,
            public_path: None,
            library: None,
            async_chunks: None,
            is_server_component: false,
        }
    }

    pub fn with_layer(mut self, layer: Option<Layer>) -> Self {
        self.layer = layer;
        self
    }

    /// The first virtual-module import, if the entry has one
    pub fn loader(&self) -> Option<&LoaderOptions> {
        self.import.iter().find_map(EntryImport::loader)
    }
}

/// Entries for every compiler
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entrypoints {
    pub client: BTreeMap<String, EntryDescriptor>,
    pub server: BTreeMap<String, EntryDescriptor>,
    pub edge_server: BTreeMap<String, EntryDescriptor>,

    /// Matchers of the middleware file, if there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middleware_matchers: Option<Vec<MiddlewareMatcher>>,

    /// Routes that failed and were left out
    #[serde(skip)]
    pub failures: Vec<RouteFailure>,
}

impl Entrypoints {
    pub fn for_target(&self, target: Target) -> &BTreeMap<String, EntryDescriptor> {
        match target {
            Target::Client => &self.client,
            Target::Server => &self.server,
            Target::EdgeServer => &self.edge_server,
        }
    }

    fn for_target_mut(&mut self, target: Target) -> &mut BTreeMap<String, EntryDescriptor> {
        match target {
            Target::Client => &mut self.client,
            Target::Server => &mut self.server,
            Target::EdgeServer => &mut self.edge_server,
        }
    }

    /// Finalized entries for a compiler, looked up by compiler name
    pub fn finalized(&self, compiler: &str, has_app_dir: bool) -> BuildResult<BTreeMap<String, EntryDescriptor>> {
        let target: Target = compiler.parse()?;
        Ok(self
            .for_target(target)
            .iter()
            .map(|(name, entry)| (name.clone(), finalize_entrypoint(target, entry.clone(), has_app_dir)))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.client.len() + self.server.len() + self.edge_server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, target: Target, entry: EntryDescriptor) -> BuildResult<()> {
        let entries = self.for_target_mut(target);
        if let Some(existing) = entries.get(&entry.name) {
            if existing.page != entry.page {
                return Err(BuildError::conflict(
                    &entry.page,
                    format!(
                        "Entry \"{}\" for {} is also produced by page \"{}\"",
                        entry.name, target, existing.page
                    ),
                ));
            }
        }
        entries.insert(entry.name.clone(), entry);
        Ok(())
    }
}
