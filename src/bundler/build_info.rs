//! Per-module build metadata
//!
//! Pipeline phases leave facts about a module here (which route it serves,
//! its server/client classification, edge function metadata, dynamic code
//! and Node.js API usage) for later phases to read. Entries are keyed by
//! module identifier and can be written from concurrent module processing.

use std::collections::BTreeMap;
use std::mem;

use dashmap::DashMap;
use serde::Serialize;

use crate::analysis::{MiddlewareConfig, MiddlewareMatcher, RscModuleType};
use crate::resolver::SourcePosition;
use crate::transform::{DynamicEval, UnsafeConstruct};

/// The route an entry module was created for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub page: String,
    pub absolute_page_path: String,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

/// Server/client classification of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RscMeta {
    pub module_type: RscModuleType,
    /// Client modules this server module imports
    pub client_refs: Vec<String>,
}

/// What an edge entry module serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeMeta {
    Middleware {
        page: String,
        matchers: Option<Vec<MiddlewareMatcher>>,
    },
    Ssr {
        page: String,
        is_server_component: bool,
        is_app_dir: bool,
    },
    ApiFunction {
        page: String,
        matchers: Option<Vec<MiddlewareMatcher>>,
    },
}

impl EdgeMeta {
    pub fn page(&self) -> &str {
        match self {
            EdgeMeta::Middleware { page, .. } | EdgeMeta::Ssr { page, .. } | EdgeMeta::ApiFunction { page, .. } => page,
        }
    }

    /// Edge functions serve a route; middleware runs before routing
    pub fn is_edge_function(&self) -> bool {
        !matches!(self, EdgeMeta::Middleware { .. })
    }
}

/// One fact about a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildInfo {
    Route { route: RouteMeta, root_dir: Option<String> },
    Rsc(RscMeta),
    Edge(EdgeMeta),
    DynamicEval(DynamicEval),
    UnsupportedApis(Vec<UnsafeConstruct>),
    ImportLocations(BTreeMap<String, SourcePosition>),
}

/// Side table from module identifier to its build facts
#[derive(Debug, Default)]
pub struct BuildInfoTable {
    entries: DashMap<String, Vec<BuildInfo>>,
}

impl BuildInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fact, replacing an earlier one of the same kind
    pub fn record(&self, identifier: &str, info: BuildInfo) {
        let mut facts = self.entries.entry(identifier.to_string()).or_default();
        match facts.iter_mut().find(|existing| mem::discriminant(*existing) == mem::discriminant(&info)) {
            Some(existing) => *existing = info,
            None => facts.push(info),
        }
    }

    fn find<T>(&self, identifier: &str, pick: impl Fn(&BuildInfo) -> Option<T>) -> Option<T> {
        self.entries.get(identifier)?.iter().find_map(pick)
    }

    pub fn route(&self, identifier: &str) -> Option<(RouteMeta, Option<String>)> {
        self.find(identifier, |info| match info {
            BuildInfo::Route { route, root_dir } => Some((route.clone(), root_dir.clone())),
            _ => None,
        })
    }

    pub fn rsc(&self, identifier: &str) -> Option<RscMeta> {
        self.find(identifier, |info| match info {
            BuildInfo::Rsc(meta) => Some(meta.clone()),
            _ => None,
        })
    }

    pub fn edge(&self, identifier: &str) -> Option<EdgeMeta> {
        self.find(identifier, |info| match info {
            BuildInfo::Edge(meta) => Some(meta.clone()),
            _ => None,
        })
    }

    pub fn dynamic_eval(&self, identifier: &str) -> Option<DynamicEval> {
        self.find(identifier, |info| match info {
            BuildInfo::DynamicEval(usage) => Some(usage.clone()),
            _ => None,
        })
    }

    pub fn unsupported_apis(&self, identifier: &str) -> Vec<UnsafeConstruct> {
        self.find(identifier, |info| match info {
            BuildInfo::UnsupportedApis(constructs) => Some(constructs.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn import_locations(&self, identifier: &str) -> Option<BTreeMap<String, SourcePosition>> {
        self.find(identifier, |info| match info {
            BuildInfo::ImportLocations(locations) => Some(locations.clone()),
            _ => None,
        })
    }

    pub fn is_client_module(&self, identifier: &str) -> bool {
        self.rsc(identifier)
            .map_or(false, |meta| meta.module_type == RscModuleType::Client)
    }

    pub fn remove(&self, identifier: &str) {
        self.entries.remove(identifier);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
