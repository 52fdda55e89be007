//! Module graph data structures

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::entries::Layer;

/// Index of a module in the graph arena
pub type ModuleId = usize;

/// Id the runtime uses for a module or chunk: numeric in production,
/// readable in development
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RuntimeId {
    Number(u64),
    Named(String),
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeId::Number(n) => write!(f, "{}", n),
            RuntimeId::Named(name) => f.write_str(name),
        }
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Unique key: layer plus request
    pub identifier: String,

    /// Request that created the module; loader requests for virtual modules
    pub request: String,

    /// File backing the module, `None` for virtual and framework modules
    pub resource: Option<PathBuf>,

    pub layer: Option<Layer>,

    /// Transformed code
    pub source: String,

    pub runtime_id: Option<RuntimeId>,

    /// Module that first imported this one
    pub issuer: Option<ModuleId>,

    /// Uses top-level await
    pub is_async: bool,

    /// Exports some importer uses; `None` when usage is unknown
    pub used_exports: Option<BTreeSet<String>>,
}

impl Module {
    pub fn new(identifier: impl Into<String>, request: impl Into<String>, layer: Option<Layer>) -> Self {
        Self {
            identifier: identifier.into(),
            request: request.into(),
            resource: None,
            layer,
            source: String::new(),
            runtime_id: None,
            issuer: None,
            is_async: false,
            used_exports: Some(BTreeSet::new()),
        }
    }

    /// Identifier for a request in a layer
    pub fn identifier_for(layer: Option<Layer>, request: &str) -> String {
        match layer {
            Some(layer) => format!("({}){}", layer, request),
            None => request.to_string(),
        }
    }
}

/// A dependency edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub origin: ModuleId,
    pub module: ModuleId,
    pub request: String,
    /// Created by `import()`
    pub is_async: bool,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,

    by_identifier: HashMap<String, ModuleId>,

    /// Outgoing connections in source order
    outgoing: HashMap<ModuleId, Vec<Connection>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning the existing id when the identifier is known
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.by_identifier.get(&module.identifier) {
            return id;
        }

        let id = self.modules.len();
        self.by_identifier.insert(module.identifier.clone(), id);
        self.modules.push(module);
        id
    }

    /// Record that `origin` imports `module`. The first importer becomes
    /// the issuer.
    pub fn connect(&mut self, origin: ModuleId, module: ModuleId, request: impl Into<String>, is_async: bool) {
        let connections = self.outgoing.entry(origin).or_default();
        if connections.iter().any(|c| c.module == module) {
            return;
        }
        connections.push(Connection {
            origin,
            module,
            request: request.into(),
            is_async,
        });

        if let Some(target) = self.modules.get_mut(module) {
            if target.issuer.is_none() && origin != module {
                target.issuer = Some(origin);
            }
        }
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    pub fn find(&self, identifier: &str) -> Option<ModuleId> {
        self.by_identifier.get(identifier).copied()
    }

    /// Outgoing connections of a module in the order they were made
    pub fn connections(&self, id: ModuleId) -> &[Connection] {
        self.outgoing.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Mark exports of `id` as used; `None` marks everything
    pub fn use_exports(&mut self, id: ModuleId, names: Option<&BTreeSet<String>>) {
        let Some(module) = self.modules.get_mut(id) else { return };
        match (module.used_exports.as_mut(), names) {
            (Some(used), Some(names)) => used.extend(names.iter().cloned()),
            (Some(_), None) => module.used_exports = None,
            (None, _) => {}
        }
    }

    /// Modules reachable from `start` over synchronous connections (BFS)
    pub fn reachable(&self, start: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::from([start]);
        let mut result = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            result.push(id);
            for connection in self.connections(id) {
                if !connection.is_async && visited.insert(connection.module) {
                    queue.push_back(connection.module);
                }
            }
        }

        result
    }

    /// Issuers of a module, nearest first, ending at the entry
    pub fn issuer_chain(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.module(id).and_then(|m| m.issuer);

        while let Some(issuer) = current {
            if !seen.insert(issuer) {
                break;
            }
            chain.push(issuer);
            current = self.module(issuer).and_then(|m| m.issuer);
        }
        chain
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
