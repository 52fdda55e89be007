//! Client reference manifests
//!
//! For every app page and route handler, maps each client module the
//! server may render a reference to onto the browser chunks that load it
//! and onto the ids of its server-side copies.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::bundler::{ChunkGroupId, Compilation, Module, RuntimeId};
use crate::entries::{Layer, Target, APP_CLIENT_INTERNALS, CLIENT_RUNTIME_MAIN, CLIENT_RUNTIME_MAIN_APP,
    CLIENT_RUNTIME_REACT_REFRESH, FLIGHT_CLIENT_ENTRY_LOADER};
use crate::error::BuildResult;
use crate::plugins::{CompilationPlugin, PluginContext, ProcessAssetsStage};
use crate::routes::is_metadata_route;
use crate::utils::{encode_uri_path, is_group_segment, normalize_page_path, normalize_path_sep};

pub const CLIENT_REFERENCE_MANIFEST: &str = "client-reference-manifest";

/// Entry points whose chunks every page already loads
const SYSTEM_ENTRYPOINTS: [&str; 3] = [CLIENT_RUNTIME_MAIN, CLIENT_RUNTIME_REACT_REFRESH, CLIENT_RUNTIME_MAIN_APP];

/// Request prefix of modules rewritten by barrel optimization
const BARREL_OPTIMIZATION_PREFIX: &str = "__barrel_optimize__";

/// Id and async flag of a module in a server compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    #[serde(rename = "moduleId")]
    pub module_id: RuntimeId,
    #[serde(rename = "async")]
    pub is_async: bool,
}

/// Server-side module ids keyed by `./relative/path`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientReferenceState {
    pub ssr_modules: BTreeMap<String, ModuleInfo>,
    pub edge_ssr_modules: BTreeMap<String, ModuleInfo>,
    pub rsc_modules: BTreeMap<String, ModuleInfo>,
    pub edge_rsc_modules: BTreeMap<String, ModuleInfo>,
}

impl ClientReferenceState {
    /// Record the SSR copies and server proxies of a server compilation
    pub fn record(&mut self, compilation: &Compilation) {
        let edge = compilation.target == Target::EdgeServer;
        for (_, module) in compilation.graph.iter() {
            let (Some(resource), Some(module_id)) = (&module.resource, &module.runtime_id) else {
                continue;
            };
            let key = compilation
                .relative_resource(resource)
                .replace("/strata/dist/esm/", "/strata/dist/");
            let info = ModuleInfo {
                module_id: module_id.clone(),
                is_async: module.is_async,
            };

            match module.layer {
                Some(Layer::ServerSideRendering) => {
                    let modules = if edge { &mut self.edge_ssr_modules } else { &mut self.ssr_modules };
                    modules.insert(key, info);
                }
                Some(Layer::ReactServerComponents) if compilation.build_info.is_client_module(&module.identifier) => {
                    let modules = if edge { &mut self.edge_rsc_modules } else { &mut self.rsc_modules };
                    modules.insert(key, info);
                }
                _ => {}
            }
        }
    }
}

/// How the browser loads chunks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLoading {
    pub prefix: String,
    pub cross_origin: Option<String>,
}

/// One client module export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestNode {
    pub id: RuntimeId,
    pub name: String,
    /// Flattened `[chunk id, chunk file, ...]` pairs
    pub chunks: Vec<String>,
    #[serde(rename = "async")]
    pub is_async: bool,
}

pub type ModuleMapping = BTreeMap<String, BTreeMap<String, ManifestNode>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReferenceManifest {
    pub module_loading: ModuleLoading,
    pub ssr_module_mapping: ModuleMapping,
    #[serde(rename = "edgeSSRModuleMapping")]
    pub edge_ssr_module_mapping: ModuleMapping,
    pub client_modules: BTreeMap<String, ManifestNode>,
    #[serde(rename = "entryCSSFiles")]
    pub entry_css_files: BTreeMap<String, Vec<String>>,
    pub rsc_module_mapping: ModuleMapping,
    pub edge_rsc_module_mapping: ModuleMapping,
}

impl ClientReferenceManifest {
    pub fn new(module_loading: ModuleLoading) -> Self {
        Self {
            module_loading,
            ..Self::default()
        }
    }

    /// Shallow union; on key collisions `other` wins
    pub fn merge(&mut self, other: &ClientReferenceManifest) {
        fn union<V: Clone>(into: &mut BTreeMap<String, V>, from: &BTreeMap<String, V>) {
            into.extend(from.iter().map(|(key, value)| (key.clone(), value.clone())));
        }

        union(&mut self.client_modules, &other.client_modules);
        union(&mut self.entry_css_files, &other.entry_css_files);
        union(&mut self.ssr_module_mapping, &other.ssr_module_mapping);
        union(&mut self.edge_ssr_module_mapping, &other.edge_ssr_module_mapping);
        union(&mut self.rsc_module_mapping, &other.rsc_module_mapping);
        union(&mut self.edge_rsc_module_mapping, &other.edge_rsc_module_mapping);
    }

    fn record_module(&mut self, compilation: &Compilation, module: &Module, chunks: &[String], state: &ClientReferenceState) {
        let (Some(path), Some(module_id)) = (&module.resource, &module.runtime_id) else {
            return;
        };
        let mut resource = normalize_path_sep(&path.to_string_lossy());
        let mut named_id = compilation.relative_resource(path);
        let esm_resource = resource
            .contains("/strata/dist/")
            .then(|| resource.replacen("/strata/dist/", "/strata/dist/esm/", 1));

        if module.request.starts_with(BARREL_OPTIMIZATION_PREFIX) {
            resource = format!("{}@{}", resource, module.request);
            named_id = format!("{}@{}", named_id, module.request);
        }

        let is_async = module.is_async
            || state.ssr_modules.get(&named_id).map_or(false, |info| info.is_async)
            || state.edge_ssr_modules.get(&named_id).map_or(false, |info| info.is_async);
        let node = ManifestNode {
            id: module_id.clone(),
            name: "*".to_string(),
            chunks: chunks.to_vec(),
            is_async,
        };
        if let Some(esm_resource) = esm_resource {
            self.client_modules.insert(esm_resource, node.clone());
        }

        let mappings = [
            (&mut self.ssr_module_mapping, &state.ssr_modules),
            (&mut self.edge_ssr_module_mapping, &state.edge_ssr_modules),
            (&mut self.rsc_module_mapping, &state.rsc_modules),
            (&mut self.edge_rsc_module_mapping, &state.edge_rsc_modules),
        ];
        for (mapping, modules) in mappings {
            if let Some(info) = modules.get(&named_id) {
                mapping.entry(module_id.to_string()).or_default().insert(
                    "*".to_string(),
                    ManifestNode {
                        id: info.module_id.clone(),
                        chunks: Vec::new(),
                        is_async: info.is_async,
                        ..node.clone()
                    },
                );
            }
        }

        self.client_modules.insert(resource, node);
    }
}

fn is_dynamic_segment(segment: &str) -> bool {
    segment.starts_with('[') && segment.ends_with(']')
}

/// The manifest group an entry belongs to.
///
/// Parallel route slots, route groups and dynamic segments are dropped so
/// everything rendered on one URL shares a group. Intercepting segments are
/// moved to the route they intercept: `(...)` to the app root, `(.)` in
/// place and each `(..)` one level up.
pub fn entry_name_to_group_name(entry_name: &str) -> String {
    let parent = entry_name.rsplit_once('/').map_or("", |(parent, _)| parent);
    let mut segments: Vec<String> = parent
        .split('/')
        .filter(|s| !s.starts_with('@') && !is_group_segment(s) && !is_dynamic_segment(s))
        .map(str::to_string)
        .collect();

    if let Some(index) = segments.iter().rposition(|s| s.starts_with("(...)")) {
        let mut rest = segments.split_off(index);
        rest[0] = rest[0]["(...)".len()..].to_string();
        segments = vec!["app".to_string()];
        segments.extend(rest);
    }

    for segment in &mut segments {
        if let Some(target) = segment.strip_prefix("(.)") {
            *segment = target.to_string();
        }
    }

    while let Some(index) = segments.iter().position(|s| s.starts_with("(..)")) {
        if index < 2 {
            break;
        }
        segments[index] = segments[index]["(..)".len()..].to_string();
        segments.remove(index - 1);
    }

    segments.join("/")
}

/// `[chunk id, encoded file, ...]` for the JS files a chunk group and its
/// descendants load, minus system entry chunks and `excluded` files
pub fn required_chunks(compilation: &Compilation, group: ChunkGroupId, excluded: &HashSet<String>) -> Vec<String> {
    let mut chunks = Vec::new();
    for chunk in compilation
        .chunks
        .walk(group)
        .chunks
        .into_iter()
        .filter_map(|id| compilation.chunks.chunk(id))
    {
        if chunk.name.as_deref().map_or(false, |name| SYSTEM_ENTRYPOINTS.contains(&name)) {
            continue;
        }
        let Some(chunk_id) = &chunk.runtime_id else { continue };
        for file in &chunk.files {
            if !file.ends_with(".js") || file.ends_with(".hot-update.js") || excluded.contains(file) {
                continue;
            }
            chunks.push(chunk_id.to_string());
            chunks.push(encode_uri_path(file));
        }
    }
    chunks
}

/// `app/blog/page.tsx` style entry names normalize to `app/blog/page`
fn manifest_entry_file(entry_name: &str) -> Option<String> {
    let (dir, last) = entry_name.rsplit_once('/')?;
    if last == "page" || last.starts_with("page.") {
        return Some(format!("{}/page", dir));
    }
    (last == "route" && !is_metadata_route(entry_name)).then(|| entry_name.to_string())
}

/// Merged manifests for every app page and route handler of a client compilation
pub fn client_reference_manifests(
    compilation: &Compilation,
    state: &ClientReferenceState,
    module_loading: &ModuleLoading,
) -> BTreeMap<String, ClientReferenceManifest> {
    let root_main_files: HashSet<String> = compilation
        .entry_files(CLIENT_RUNTIME_MAIN_APP)
        .into_iter()
        .filter(|file| file.ends_with(".js"))
        .collect();

    let mut manifests_per_group: BTreeMap<String, Vec<ClientReferenceManifest>> = BTreeMap::new();
    let mut entry_files = BTreeSet::new();

    for (name, entry) in &compilation.entries {
        let entry_name = if name == CLIENT_RUNTIME_MAIN_APP || name == APP_CLIENT_INTERNALS {
            ""
        } else if name.starts_with("app/") {
            name.as_str()
        } else {
            continue;
        };

        let mut manifest = ClientReferenceManifest::new(module_loading.clone());
        let css_files = compilation
            .chunks
            .group_files(entry.group)
            .into_iter()
            .filter(|file| file.ends_with(".css") && !file.starts_with("static/css/pages/"))
            .collect();
        manifest.entry_css_files.insert(name.clone(), css_files);

        let chunks = required_chunks(compilation, entry.group, &root_main_files);
        let loader_signature = format!("{}?", FLIGHT_CLIENT_ENTRY_LOADER);
        for chunk in compilation
            .chunks
            .walk(entry.group)
            .chunks
            .into_iter()
            .filter_map(|id| compilation.chunks.chunk(id))
        {
            for &entry_module in &chunk.entry_modules {
                let Some(module) = compilation.graph.module(entry_module) else { continue };
                if module.layer != Some(Layer::AppPagesBrowser) || !module.request.contains(&loader_signature) {
                    continue;
                }
                for connection in compilation.graph.connections(entry_module) {
                    if let Some(client_module) = compilation.graph.module(connection.module) {
                        manifest.record_module(compilation, client_module, &chunks, state);
                    }
                }
            }
        }

        if let Some(file) = manifest_entry_file(entry_name) {
            entry_files.insert(file);
        }
        manifests_per_group
            .entry(entry_name_to_group_name(entry_name))
            .or_default()
            .push(manifest);
    }

    entry_files
        .into_iter()
        .map(|page_name| {
            let mut merged = ClientReferenceManifest::new(module_loading.clone());
            let group_name = entry_name_to_group_name(&page_name);
            let mut group = String::new();
            for segment in group_name.split('/').chain(["page"]) {
                for manifest in manifests_per_group.get(&group).into_iter().flatten() {
                    merged.merge(manifest);
                }
                if !group.is_empty() {
                    group.push('/');
                }
                group.push_str(segment);
            }
            (page_name, merged)
        })
        .collect()
}

/// Asset name and source of a page's manifest
pub fn manifest_asset(page_name: &str, manifest: &ClientReferenceManifest) -> BuildResult<(String, String)> {
    let page_path = page_name.replace("%5F", "_");
    let page = page_path.strip_prefix("app").unwrap_or(&page_path);
    let name = format!(
        "server/app{}_{}.js",
        normalize_page_path(page),
        CLIENT_REFERENCE_MANIFEST
    );
    let source = format!(
        "globalThis.__RSC_MANIFEST=(globalThis.__RSC_MANIFEST||{{}});globalThis.__RSC_MANIFEST[{}]={}",
        serde_json::to_string(page)?,
        serde_json::to_string(manifest)?
    );
    Ok((name, source))
}

/// Emits `server/app/<page>_client-reference-manifest.js` for the client compiler
#[derive(Debug, Default)]
pub struct ClientReferenceManifestPlugin;

#[async_trait]
impl CompilationPlugin for ClientReferenceManifestPlugin {
    fn name(&self) -> &str {
        "client-reference-manifest"
    }

    fn applies_to(&self, target: Target) -> bool {
        target == Target::Client
    }

    async fn process_assets(
        &self,
        stage: ProcessAssetsStage,
        compilation: &mut Compilation,
        cx: &PluginContext,
    ) -> BuildResult<()> {
        if stage != ProcessAssetsStage::OptimizeHash || cx.dirs.app_dir.is_none() {
            return Ok(());
        }

        let module_loading = ModuleLoading {
            prefix: cx.config.output.public_path.clone(),
            cross_origin: cx.config.output.cross_origin.clone(),
        };
        let manifests = client_reference_manifests(compilation, &cx.client_references, &module_loading);
        for (page_name, manifest) in &manifests {
            let (name, source) = manifest_asset(page_name, manifest)?;
            debug!("Emitting {} ({} client modules)", name, manifest.client_modules.len());
            compilation.emit_asset(name, source);
        }
        info!("Emitted {} client reference manifests", manifests.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Chunk;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_group_names() {
        assert_eq!(entry_name_to_group_name("app/(marketing)/blog/[slug]/page"), "app/blog");
        assert_eq!(entry_name_to_group_name("app/blog/@modal/(..)photo/[id]/page"), "app/photo");
        assert_eq!(entry_name_to_group_name("app/shop/[...slug]/page"), "app/shop");
        assert_eq!(entry_name_to_group_name("app/docs/[[...slug]]/page"), "app/docs");
        assert_eq!(entry_name_to_group_name("app/feed/@modal/(...)photo/page"), "app/photo");
        assert_eq!(entry_name_to_group_name("app/a/b/(..)(..)photo/page"), "app/photo");
        assert_eq!(entry_name_to_group_name("app/feed/(.)photo/page"), "app/feed/photo");
        assert_eq!(entry_name_to_group_name("app/layout"), "app");
        assert_eq!(entry_name_to_group_name(""), "");
    }

    #[test]
    fn test_manifest_entry_files() {
        assert_eq!(manifest_entry_file("app/blog/page"), Some("app/blog/page".to_string()));
        assert_eq!(manifest_entry_file("app/blog/page.mdx"), Some("app/blog/page".to_string()));
        assert_eq!(manifest_entry_file("app/api/route"), Some("app/api/route".to_string()));
        assert_eq!(manifest_entry_file("app/robots.txt/route"), None);
        assert_eq!(manifest_entry_file("app/blog/layout"), None);
    }

    fn add_chunk(compilation: &mut Compilation, name: Option<&str>, id: u64, file: &str) -> usize {
        let mut chunk = Chunk::new(name.map(str::to_string));
        chunk.runtime_id = Some(RuntimeId::Number(id));
        chunk.files.push(file.to_string());
        compilation.chunks.add_chunk(chunk)
    }

    #[test]
    fn test_required_chunks_walk_shared_children_once() {
        let mut compilation = Compilation::new(Target::Client, false, "/project");
        let page = add_chunk(&mut compilation, Some("app/page"), 1, "static/chunks/app/[id]/page.js");
        let left = add_chunk(&mut compilation, None, 2, "static/chunks/2.js");
        let right = add_chunk(&mut compilation, None, 3, "static/chunks/3.js");
        let shared = add_chunk(&mut compilation, None, 4, "static/chunks/4.js");
        let main_app = add_chunk(&mut compilation, Some("main-app"), 5, "static/chunks/main-app.js");
        let css = add_chunk(&mut compilation, None, 6, "static/css/page.css");
        let hot = add_chunk(&mut compilation, None, 7, "static/chunks/page.hot-update.js");
        let root_main = add_chunk(&mut compilation, None, 8, "static/chunks/root.js");

        let chunks = &mut compilation.chunks;
        let entry = chunks.add_group(Some("app/page".into()), vec![page, main_app, css, hot, root_main]);
        let left = chunks.add_group(None, vec![left]);
        let right = chunks.add_group(None, vec![right]);
        let shared = chunks.add_group(None, vec![shared]);
        chunks.add_child(entry, left);
        chunks.add_child(entry, right);
        chunks.add_child(left, shared);
        chunks.add_child(right, shared);
        chunks.add_child(shared, left);

        let excluded = HashSet::from(["static/chunks/root.js".to_string()]);
        assert_eq!(
            required_chunks(&compilation, entry, &excluded),
            vec![
                "1",
                "static/chunks/app/%5Bid%5D/page.js",
                "2",
                "static/chunks/2.js",
                "4",
                "static/chunks/4.js",
                "3",
                "static/chunks/3.js",
            ]
        );
    }

    fn client_module(compilation: &mut Compilation, path: &str, id: u64) -> usize {
        let request = format!("/project/{}", path);
        let mut module = Module::new(
            Module::identifier_for(Some(Layer::AppPagesBrowser), &request),
            &request,
            Some(Layer::AppPagesBrowser),
        );
        module.resource = Some(PathBuf::from(&request));
        module.runtime_id = Some(RuntimeId::Number(id));
        compilation.graph.add_module(module)
    }

    /// A flight client entry named `name` loading the given client modules
    fn flight_entry(compilation: &mut Compilation, name: &str, modules: &[usize]) {
        let request = format!("{}?page={}!", FLIGHT_CLIENT_ENTRY_LOADER, name);
        let mut loader = Module::new(
            Module::identifier_for(Some(Layer::AppPagesBrowser), &request),
            &request,
            Some(Layer::AppPagesBrowser),
        );
        loader.runtime_id = Some(RuntimeId::Named(request.clone()));
        let loader = compilation.graph.add_module(loader);
        for &module in modules {
            compilation.graph.connect(loader, module, "./client", false);
        }

        let mut chunk = Chunk::new(Some(name.to_string()));
        chunk.runtime_id = Some(RuntimeId::Named(name.to_string()));
        chunk.files.push(format!("static/chunks/{}.js", name));
        chunk.entry_modules.push(loader);
        let chunk = compilation.chunks.add_chunk(chunk);
        let group = compilation.chunks.add_group(Some(name.to_string()), vec![chunk]);

        let descriptor = crate::entries::EntryDescriptor::new(
            name,
            "/page",
            crate::routes::RouteCollection::App,
            Vec::new(),
        );
        compilation.entries.insert(
            name.to_string(),
            crate::bundler::CompiledEntry {
                descriptor,
                group,
                modules: vec![loader],
            },
        );
    }

    #[test]
    fn test_page_manifest_is_superset_of_its_layouts() {
        let mut compilation = Compilation::new(Target::Client, false, "/project");
        let nav = client_module(&mut compilation, "app/nav.tsx", 10);
        let sidebar = client_module(&mut compilation, "app/blog/sidebar.tsx", 11);
        let like = client_module(&mut compilation, "app/blog/[slug]/like.tsx", 12);
        let footer = client_module(&mut compilation, "app/about/footer.tsx", 13);
        flight_entry(&mut compilation, "app/layout", &[nav]);
        flight_entry(&mut compilation, "app/blog/layout", &[sidebar]);
        flight_entry(&mut compilation, "app/blog/[slug]/page", &[like]);
        flight_entry(&mut compilation, "app/about/page", &[footer]);

        let mut state = ClientReferenceState::default();
        state.ssr_modules.insert(
            "./app/blog/[slug]/like.tsx".to_string(),
            ModuleInfo {
                module_id: RuntimeId::Number(99),
                is_async: true,
            },
        );

        let manifests = client_reference_manifests(&compilation, &state, &ModuleLoading::default());
        assert_eq!(
            manifests.keys().collect::<Vec<_>>(),
            vec!["app/about/page", "app/blog/[slug]/page"]
        );

        let page = &manifests["app/blog/[slug]/page"];
        let keys: BTreeSet<&String> = page.client_modules.keys().collect();
        for layout_key in ["/project/app/nav.tsx", "/project/app/blog/sidebar.tsx"] {
            assert!(keys.contains(&layout_key.to_string()), "missing {}", layout_key);
        }
        assert!(keys.contains(&"/project/app/blog/[slug]/like.tsx".to_string()));
        assert!(!keys.contains(&"/project/app/about/footer.tsx".to_string()));

        let like_node = &page.client_modules["/project/app/blog/[slug]/like.tsx"];
        assert!(like_node.is_async);
        assert_eq!(
            like_node.chunks,
            vec!["app/blog/[slug]/page", "static/chunks/app/blog/%5Bslug%5D/page.js"]
        );
        assert_eq!(page.ssr_module_mapping["12"]["*"].id, RuntimeId::Number(99));
        assert!(page.ssr_module_mapping["12"]["*"].chunks.is_empty());
    }

    #[test]
    fn test_manifest_asset() {
        let (name, source) = manifest_asset("app/blog/[slug]/page", &ClientReferenceManifest::default()).unwrap();
        assert_eq!(name, "server/app/blog/[slug]/page_client-reference-manifest.js");
        assert!(source.starts_with(
            "globalThis.__RSC_MANIFEST=(globalThis.__RSC_MANIFEST||{});globalThis.__RSC_MANIFEST[\"/blog/[slug]/page\"]="
        ));
        assert!(source.contains("\"edgeSSRModuleMapping\":{}"));
        assert!(source.contains("\"entryCSSFiles\":{}"));
    }
}
