//! Build engines
//!
//! A [`BuildEngine`] turns one compiler's finalized entries into a
//! [`Compilation`]. Production bundling is a collaborator behind the trait;
//! [`EntryOnlyEngine`] follows imports from source, builds the module and
//! chunk graphs and emits one file per chunk, which is enough for entry
//! planning, manifests and the dev server.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{
    BuildInfo, Chunk, ChunkGroupId, Compilation, CompiledEntry, EdgeMeta, Module, ModuleId, RouteMeta, RscMeta,
    RuntimeId,
};
use crate::analysis::scan::{blank_comments, client_module_label, scan_module};
use crate::analysis::RscModuleType;
use crate::entries::{AppLoaderOptions, EntryDescriptor, EntryImport, Layer, LoaderOptions, Target};
use crate::error::{BuildError, BuildResult};
use crate::resolver::{ImportKind, ImportSpec, ImportedNames, Resolution, Resolver};
use crate::routes::{middleware_route, page_file_path, resolve_page_alias, PageSource, RouteDirs};
use crate::transform::{TransformRequest, Transformer};
use crate::utils::normalize_path_sep;

/// Framework modules are provided by the runtime, not read from disk
const INTERNAL_MODULE_PREFIX: &str = "strata/";

/// App segment files wrapping a page, outermost first within a directory
const SEGMENT_CONVENTIONS: [&str; 5] = ["layout", "template", "error", "loading", "not-found"];

static TOP_LEVEL_AWAIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:export\s+)?(?:(?:const|let|var)\s+[^=\n]+=\s*)?await\b").unwrap()
});

/// Project layout an engine compiles against
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub dirs: RouteDirs,
    pub page_extensions: Vec<String>,
    pub dev: bool,
}

/// The module bundler
#[async_trait]
pub trait BuildEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Compile the entries of one target
    async fn compile(
        &self,
        target: Target,
        entries: &BTreeMap<String, EntryDescriptor>,
        ctx: &CompileContext,
    ) -> BuildResult<Compilation>;
}

/// Follows entry imports through the source tree
#[derive(Clone, Default)]
pub struct EntryOnlyEngine {
    transformer: Transformer,
}

impl EntryOnlyEngine {
    pub fn new(transformer: Transformer) -> Self {
        Self { transformer }
    }
}

#[async_trait]
impl BuildEngine for EntryOnlyEngine {
    fn name(&self) -> &str {
        "entry-only"
    }

    async fn compile(
        &self,
        target: Target,
        entries: &BTreeMap<String, EntryDescriptor>,
        ctx: &CompileContext,
    ) -> BuildResult<Compilation> {
        let start = Instant::now();
        let mut state = CompileState {
            compilation: Compilation::new(target, ctx.dev, &ctx.dirs.root_dir),
            resolver: Resolver::new(&ctx.page_extensions),
            transformer: &self.transformer,
            ctx,
            ssr_copies: HashMap::new(),
        };

        for (name, entry) in entries {
            state.add_entry(name, entry).await?;
        }

        let mut compilation = state.finish();
        mark_async_modules(&mut compilation);
        assign_runtime_ids(&mut compilation);
        emit_chunks(&mut compilation);
        compilation.update_hash();

        info!(
            "Compiled {} ({} entries, {} modules) in {:?}",
            target,
            compilation.entries.len(),
            compilation.graph.len(),
            start.elapsed()
        );
        Ok(compilation)
    }
}

struct CompileState<'a> {
    compilation: Compilation,
    resolver: Resolver,
    transformer: &'a Transformer,
    ctx: &'a CompileContext,
    /// Server-component proxy of a client module -> its copy in the SSR layer
    ssr_copies: HashMap<ModuleId, ModuleId>,
}

impl<'a> CompileState<'a> {
    async fn add_entry(&mut self, name: &str, entry: &EntryDescriptor) -> BuildResult<()> {
        debug!("Compiling entry {} ({})", name, self.compilation.target);
        let chunk = self.compilation.chunks.add_chunk(Chunk::new(Some(name.to_string())));
        let group = self.compilation.chunks.add_group(Some(name.to_string()), vec![chunk]);

        let issuers = vec![name.to_string()];
        let mut modules = Vec::new();
        for import in &entry.import {
            let result = match import {
                EntryImport::Loader(options) => self.add_loader_module(options, entry.layer, &issuers).await,
                EntryImport::Module(path) => self.add_dependency(path, entry.layer, &issuers).await,
            };
            match result {
                Ok(id) => modules.push(id),
                Err(error @ BuildError::Internal(_)) => return Err(error),
                Err(error) => self.compilation.errors.push(error),
            }
        }

        if let Some(chunk) = self.compilation.chunks.chunk_mut(chunk) {
            chunk.entry_modules = modules.clone();
        }
        self.compilation.entries.insert(
            name.to_string(),
            CompiledEntry {
                descriptor: entry.clone(),
                group,
                modules,
            },
        );
        Ok(())
    }

    /// The virtual module of a loader request, connected to the user
    /// modules it wraps
    async fn add_loader_module(
        &mut self,
        options: &LoaderOptions,
        layer: Option<Layer>,
        issuers: &[String],
    ) -> BuildResult<ModuleId> {
        let request = options.to_request()?;
        let identifier = Module::identifier_for(layer, &request);
        if let Some(id) = self.compilation.graph.find(&identifier) {
            return Ok(id);
        }

        let dependencies = self.loader_dependencies(options, layer).await;
        let mut module = Module::new(&identifier, &request, layer);
        module.source = dependencies
            .iter()
            .map(|(path, _)| format!("import {};\n", serde_json::Value::from(path.as_str())))
            .collect();
        let id = self.compilation.graph.add_module(module);
        self.record_loader_info(&identifier, options);

        let mut child_issuers = vec![options.page().to_string()];
        child_issuers.extend(issuers.iter().cloned());
        for (path, dependency_layer) in dependencies {
            match self.add_dependency(&path, dependency_layer, &child_issuers).await {
                Ok(child) => {
                    self.compilation.graph.connect(id, child, path, false);
                    self.compilation.graph.use_exports(child, None);
                }
                Err(error) => self.compilation.errors.push(error),
            }
        }

        Ok(id)
    }

    /// Modules a loader wraps, with the layer each is compiled in
    async fn loader_dependencies(&self, options: &LoaderOptions, layer: Option<Layer>) -> Vec<(String, Option<Layer>)> {
        let rsc = Some(Layer::ReactServerComponents);
        match options {
            LoaderOptions::App(app) => self.app_segments(app).await.into_iter().map(|p| (p, rsc)).collect(),
            LoaderOptions::EdgeSsr(ssr) => match &ssr.app_loader {
                Some(app) => self.app_segments(app).await.into_iter().map(|p| (p, rsc)).collect(),
                None => [
                    ssr.absolute_app_path.as_ref(),
                    ssr.absolute_document_path.as_ref(),
                    ssr.absolute_error_path.as_ref(),
                    ssr.absolute_500_path.as_ref(),
                    Some(&ssr.absolute_page_path),
                ]
                .into_iter()
                .flatten()
                .map(|path| (path.clone(), layer))
                .collect(),
            },
            LoaderOptions::EdgeAppRoute(route) => vec![(route.absolute_page_path.clone(), rsc)],
            LoaderOptions::Route(route) => {
                let mut paths = vec![(route.absolute_page_path.clone(), layer)];
                if let Some(special) = &route.special_pages {
                    paths.extend(special.app.iter().chain(special.document.iter()).map(|p| (p.clone(), layer)));
                }
                paths
            }
            LoaderOptions::FlightClientEntry(client) => client
                .modules
                .iter()
                .map(|module| (module.request.clone(), layer))
                .collect(),
            LoaderOptions::ClientPages(_) | LoaderOptions::Middleware(_) | LoaderOptions::EdgeFunction(_) => {
                vec![(options.absolute_page_path().to_string(), layer)]
            }
        }
    }

    /// Layout chain of an app route followed by the route module itself
    async fn app_segments(&self, app: &AppLoaderOptions) -> Vec<String> {
        let mut segments = Vec::new();
        let Some(app_dir) = self.ctx.dirs.app_dir.as_deref() else {
            return vec![app.page_path.clone()];
        };

        if app.page.ends_with("/page") || !app.page.ends_with("/route") {
            let page_file = page_file_path(&app.page_path, &self.ctx.dirs);
            let page_dir = if page_file.starts_with(app_dir) {
                page_file.parent().unwrap_or(app_dir).to_path_buf()
            } else {
                app_dir.to_path_buf()
            };

            let mut dirs: Vec<&Path> = page_dir.ancestors().take_while(|dir| dir.starts_with(app_dir)).collect();
            dirs.reverse();
            for dir in dirs {
                for convention in SEGMENT_CONVENTIONS {
                    for ext in &self.ctx.page_extensions {
                        let candidate = dir.join(format!("{}.{}", convention, ext));
                        if tokio::fs::metadata(&candidate).await.map_or(false, |m| m.is_file()) {
                            segments.push(normalize_path_sep(&candidate.to_string_lossy()));
                            break;
                        }
                    }
                }
            }
        }

        segments.push(app.page_path.clone());
        segments
    }

    fn record_loader_info(&self, identifier: &str, options: &LoaderOptions) {
        let table = &self.compilation.build_info;
        let root_dir = Some(self.ctx.dirs.root_dir.to_string_lossy().into_owned());
        let route = |preferred_region: &Option<Vec<String>>, middleware_config: &crate::analysis::MiddlewareConfig| {
            BuildInfo::Route {
                route: RouteMeta {
                    page: options.page().to_string(),
                    absolute_page_path: options.absolute_page_path().to_string(),
                    preferred_region: preferred_region.clone(),
                    middleware_config: middleware_config.clone(),
                },
                root_dir: root_dir.clone(),
            }
        };

        match options {
            LoaderOptions::App(o) => table.record(identifier, route(&o.preferred_region, &o.middleware_config)),
            LoaderOptions::Route(o) => table.record(identifier, route(&o.preferred_region, &o.middleware_config)),
            LoaderOptions::Middleware(o) => {
                table.record(identifier, route(&o.preferred_region, &o.middleware_config));
                table.record(
                    identifier,
                    BuildInfo::Edge(EdgeMeta::Middleware {
                        page: middleware_route(&o.page).to_string(),
                        matchers: o.matchers.clone(),
                    }),
                );
            }
            LoaderOptions::EdgeFunction(o) => {
                table.record(identifier, route(&o.preferred_region, &o.middleware_config));
                table.record(
                    identifier,
                    BuildInfo::Edge(EdgeMeta::ApiFunction {
                        page: o.page.clone(),
                        matchers: o.middleware_config.matchers.clone(),
                    }),
                );
            }
            LoaderOptions::EdgeSsr(o) => {
                table.record(identifier, route(&o.preferred_region, &o.middleware_config));
                table.record(
                    identifier,
                    BuildInfo::Edge(EdgeMeta::Ssr {
                        page: o.page.clone(),
                        is_server_component: o.is_server_component,
                        is_app_dir: o.app_loader.is_some(),
                    }),
                );
            }
            LoaderOptions::EdgeAppRoute(o) => {
                table.record(identifier, route(&o.preferred_region, &o.middleware_config));
                table.record(
                    identifier,
                    BuildInfo::Edge(EdgeMeta::Ssr {
                        page: o.page.clone(),
                        is_server_component: true,
                        is_app_dir: true,
                    }),
                );
            }
            LoaderOptions::ClientPages(_) | LoaderOptions::FlightClientEntry(_) => {}
        }
    }

    /// An aliased path, a framework module or a plain file
    async fn add_dependency(&mut self, path: &str, layer: Option<Layer>, issuers: &[String]) -> BuildResult<ModuleId> {
        if path.starts_with(INTERNAL_MODULE_PREFIX) {
            return Ok(self.add_internal(path, layer));
        }
        match resolve_page_alias(path, &self.ctx.dirs, &self.ctx.page_extensions) {
            PageSource::File(file) => self.add_file(file, layer, issuers.to_vec()).await,
            PageSource::Internal(request) => Ok(self.add_internal(&request, layer)),
        }
    }

    fn add_internal(&mut self, request: &str, layer: Option<Layer>) -> ModuleId {
        let identifier = Module::identifier_for(layer, request);
        self.compilation.graph.add_module(Module::new(identifier, request, layer))
    }

    fn add_file(&mut self, path: PathBuf, layer: Option<Layer>, issuers: Vec<String>) -> BoxFuture<'_, BuildResult<ModuleId>> {
        Box::pin(async move {
            let request = normalize_path_sep(&path.to_string_lossy());
            let identifier = Module::identifier_for(layer, &request);
            if let Some(id) = self.compilation.graph.find(&identifier) {
                return Ok(id);
            }

            let source = match tokio::fs::read_to_string(&path).await {
                Ok(source) => source,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    return Err(BuildError::ModuleNotFound {
                        request: request.clone(),
                        importer: self.ctx.dirs.root_dir.display().to_string(),
                        import_trace: issuers,
                    });
                }
                Err(error) => return Err(error.into()),
            };

            let is_client = scan_module(&source).is_client() || client_module_label(&source).is_some();
            let target = self.compilation.target;
            if target != Target::Client && layer == Some(Layer::ReactServerComponents) && is_client {
                return self.add_client_boundary(path, identifier, &source, issuers).await;
            }

            let mut module = Module::new(&identifier, &request, layer);
            module.resource = Some(path.clone());
            module.is_async = TOP_LEVEL_AWAIT.is_match(&blank_comments(&source));
            let id = self.compilation.graph.add_module(module);

            let module_name = self.compilation.relative_resource(&path);
            let transformed = self.transformer.transform(TransformRequest {
                source: &source,
                filename: &path,
                module: &module_name,
                layer,
                target,
                dev: self.ctx.dev,
            });
            let output = match transformed {
                Ok(output) => output,
                Err(error) => {
                    self.compilation.errors.push(error);
                    return Ok(id);
                }
            };

            if let Some(edge) = &output.edge {
                if let Some(usage) = &edge.dynamic_eval {
                    self.compilation
                        .build_info
                        .record(&identifier, BuildInfo::DynamicEval(usage.clone()));
                }
                let unsupported = edge.unsupported_apis();
                if !unsupported.is_empty() {
                    self.compilation
                        .build_info
                        .record(&identifier, BuildInfo::UnsupportedApis(unsupported));
                }
                self.compilation
                    .build_info
                    .record(&identifier, BuildInfo::ImportLocations(edge.import_locations.clone()));
            }
            if let Some(module) = self.compilation.graph.module_mut(id) {
                module.source = output.code;
            }

            let mut child_issuers = vec![module_name.clone()];
            child_issuers.extend(issuers.iter().cloned());
            let mut client_refs = Vec::new();
            for import in &output.imports {
                let Some(child) = self.add_import(id, &path, &module_name, import, layer, &issuers, &child_issuers).await
                else {
                    continue;
                };
                if let Some(child_module) = self.compilation.graph.module(child) {
                    if self.compilation.build_info.is_client_module(&child_module.identifier) {
                        client_refs.push(child_module.request.clone());
                    }
                }
            }

            if layer == Some(Layer::ReactServerComponents) {
                self.compilation.build_info.record(
                    &identifier,
                    BuildInfo::Rsc(RscMeta {
                        module_type: RscModuleType::Server,
                        client_refs,
                    }),
                );
            } else if is_client {
                self.compilation.build_info.record(
                    &identifier,
                    BuildInfo::Rsc(RscMeta {
                        module_type: RscModuleType::Client,
                        client_refs: Vec::new(),
                    }),
                );
            }

            Ok(id)
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_import(
        &mut self,
        origin: ModuleId,
        importer: &Path,
        importer_name: &str,
        import: &ImportSpec,
        layer: Option<Layer>,
        issuers: &[String],
        child_issuers: &[String],
    ) -> Option<ModuleId> {
        let path = match self.resolver.resolve_or_trace(import, importer, importer_name, issuers) {
            Ok(Resolution::File(path)) => path,
            Ok(Resolution::External) => return None,
            Err(error) => {
                self.compilation.errors.push(error);
                return None;
            }
        };

        match self.add_file(path, layer, child_issuers.to_vec()).await {
            Ok(child) => {
                let is_async = import.kind == ImportKind::Dynamic;
                self.compilation.graph.connect(origin, child, &import.specifier, is_async);
                let used = match (&import.names, import.kind) {
                    (_, ImportKind::Dynamic) | (ImportedNames::All, _) => None,
                    (ImportedNames::None, _) => Some(BTreeSet::new()),
                    (ImportedNames::Named(names), _) => Some(names.clone()),
                };
                self.compilation.graph.use_exports(child, used.as_ref());
                Some(child)
            }
            Err(error) => {
                self.compilation.errors.push(error);
                None
            }
        }
    }

    /// A client module imported from a server component: the server graph
    /// gets a reference proxy, and the module itself is compiled for SSR
    async fn add_client_boundary(
        &mut self,
        path: PathBuf,
        identifier: String,
        source: &str,
        issuers: Vec<String>,
    ) -> BuildResult<ModuleId> {
        let request = normalize_path_sep(&path.to_string_lossy());
        let exports: Vec<String> = match client_module_label(source) {
            Some((refs, _)) => refs,
            None => scan_module(source).exports.keys().cloned().collect(),
        };

        let mut proxy = Module::new(&identifier, &request, Some(Layer::ReactServerComponents));
        proxy.resource = Some(path.clone());
        proxy.source = format!(
            "module.exports = createClientModuleProxy({});",
            serde_json::Value::from(request.as_str())
        );
        let proxy_id = self.compilation.graph.add_module(proxy);
        self.compilation.build_info.record(
            &identifier,
            BuildInfo::Rsc(RscMeta {
                module_type: RscModuleType::Client,
                client_refs: exports,
            }),
        );

        let ssr = self.add_file(path, Some(Layer::ServerSideRendering), issuers).await?;
        self.ssr_copies.insert(proxy_id, ssr);
        if let Some(ssr_module) = self.compilation.graph.module(ssr) {
            let is_async = ssr_module.is_async;
            if let Some(proxy) = self.compilation.graph.module_mut(proxy_id) {
                proxy.is_async = is_async;
            }
        }
        Ok(proxy_id)
    }

    /// Fill chunks with the modules their groups reach and create a child
    /// group for every dynamically imported module
    fn finish(mut self) -> Compilation {
        let graph = &self.compilation.graph;
        let chunks = &mut self.compilation.chunks;

        let mut queue: VecDeque<(ChunkGroupId, Vec<ModuleId>)> = self
            .compilation
            .entries
            .values()
            .map(|entry| (entry.group, entry.modules.clone()))
            .collect();
        let mut async_groups: HashMap<ModuleId, ChunkGroupId> = HashMap::new();

        while let Some((group, roots)) = queue.pop_front() {
            let mut seen: HashSet<ModuleId> = roots.iter().copied().collect();
            let mut pending: VecDeque<ModuleId> = roots.into_iter().collect();
            let mut modules = Vec::new();

            while let Some(id) = pending.pop_front() {
                modules.push(id);
                for connection in graph.connections(id) {
                    if connection.is_async {
                        let child = *async_groups.entry(connection.module).or_insert_with(|| {
                            let chunk = chunks.add_chunk(Chunk::new(None));
                            let child = chunks.add_group(None, vec![chunk]);
                            queue.push_back((child, vec![connection.module]));
                            child
                        });
                        chunks.add_child(group, child);
                    } else if seen.insert(connection.module) {
                        pending.push_back(connection.module);
                    }
                }
                if let Some(&ssr) = self.ssr_copies.get(&id) {
                    if seen.insert(ssr) {
                        pending.push_back(ssr);
                    }
                }
            }

            let chunk_id = chunks.group(group).and_then(|g| g.chunks.first().copied());
            if let Some(chunk) = chunk_id.and_then(|id| chunks.chunk_mut(id)) {
                chunk.modules = modules;
            }
        }

        self.compilation
    }
}

/// A module is async when it awaits at the top level or synchronously
/// depends on an async module
fn mark_async_modules(compilation: &mut Compilation) {
    loop {
        let graph = &compilation.graph;
        let newly_async: Vec<ModuleId> = graph
            .iter()
            .filter(|(_, module)| !module.is_async)
            .filter(|(id, _)| {
                graph
                    .connections(*id)
                    .iter()
                    .any(|c| !c.is_async && graph.module(c.module).map_or(false, |m| m.is_async))
            })
            .map(|(id, _)| id)
            .collect();

        if newly_async.is_empty() {
            return;
        }
        for id in newly_async {
            if let Some(module) = compilation.graph.module_mut(id) {
                module.is_async = true;
            }
        }
    }
}

fn numeric_id(key: &str, taken: &mut HashSet<u64>) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut id = u64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]));
    while !taken.insert(id) {
        id += 1;
    }
    id
}

/// Readable ids in development, numeric hash-derived ids otherwise
fn assign_runtime_ids(compilation: &mut Compilation) {
    let dev = compilation.dev;
    let mut taken = HashSet::new();

    let module_ids: Vec<(ModuleId, String)> = compilation
        .graph
        .iter()
        .map(|(id, module)| {
            let readable = match (&module.resource, module.layer) {
                (Some(resource), Some(layer)) => format!("({})/{}", layer, compilation.relative_resource(resource)),
                (Some(resource), None) => compilation.relative_resource(resource),
                (None, _) => module.identifier.clone(),
            };
            (id, readable)
        })
        .collect();
    for (id, readable) in module_ids {
        let runtime_id = if dev {
            RuntimeId::Named(readable)
        } else {
            RuntimeId::Number(numeric_id(&readable, &mut taken))
        };
        if let Some(module) = compilation.graph.module_mut(id) {
            module.runtime_id = Some(runtime_id);
        }
    }

    let mut taken = HashSet::new();
    let chunk_names: Vec<(usize, String)> = compilation
        .chunks
        .chunks()
        .map(|(id, chunk)| (id, chunk.name.clone().unwrap_or_else(|| format!("chunk-{}", id))))
        .collect();
    for (id, name) in chunk_names {
        let runtime_id = if dev {
            RuntimeId::Named(name)
        } else {
            RuntimeId::Number(numeric_id(&name, &mut taken))
        };
        if let Some(chunk) = compilation.chunks.chunk_mut(id) {
            chunk.runtime_id = Some(runtime_id);
        }
    }
}

fn chunk_filename(target: Target, name: Option<&str>, runtime_id: &str) -> String {
    match (target, name) {
        (Target::Client, Some(name)) => format!("static/chunks/{}.js", name),
        (Target::Client, None) => format!("static/chunks/{}.js", runtime_id),
        (_, Some(name)) => format!("{}.js", name),
        (Target::Server, None) => format!("chunks/{}.js", runtime_id),
        (Target::EdgeServer, None) => format!("edge-chunks/{}.js", runtime_id),
    }
}

/// Write every chunk as a module registration script
fn emit_chunks(compilation: &mut Compilation) {
    let filenames: BTreeMap<usize, String> = compilation
        .entries
        .values()
        .filter_map(|entry| {
            let filename = entry.descriptor.filename.clone()?;
            let chunk = compilation.chunks.group(entry.group)?.chunks.first().copied()?;
            Some((chunk, filename))
        })
        .collect();

    let mut assets = Vec::new();
    for (id, chunk) in compilation.chunks.chunks() {
        let runtime_id = chunk.runtime_id.as_ref().map(ToString::to_string).unwrap_or_else(|| id.to_string());
        let file = filenames
            .get(&id)
            .cloned()
            .unwrap_or_else(|| chunk_filename(compilation.target, chunk.name.as_deref(), &runtime_id));

        let mut code = format!(
            "(self.__strata_chunks__ = self.__strata_chunks__ || []).push([{}, {{\n",
            serde_json::Value::from(runtime_id.as_str())
        );
        for module in chunk.modules.iter().filter_map(|&m| compilation.graph.module(m)) {
            let module_id = module.runtime_id.as_ref().map(ToString::to_string).unwrap_or_default();
            code.push_str(&format!(
                "{}: function(module, exports, __strata_require__) {{\n{}\n}},\n",
                serde_json::Value::from(module_id),
                module.source
            ));
        }
        let entry_ids: Vec<String> = chunk
            .entry_modules
            .iter()
            .filter_map(|&m| compilation.graph.module(m)?.runtime_id.as_ref().map(ToString::to_string))
            .collect();
        code.push_str(&format!("}}, {}]);\n", serde_json::Value::from(entry_ids)));

        assets.push((id, file, code));
    }

    for (id, file, code) in assets {
        if let Some(chunk) = compilation.chunks.chunk_mut(id) {
            chunk.files.push(file.clone());
        }
        compilation.emit_asset(file, code);
    }
}
