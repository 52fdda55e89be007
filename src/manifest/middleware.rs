//! Edge manifest
//!
//! Runs on the edge compiler. Once the module graph is final, production
//! builds reject dynamic code evaluation and Node.js APIs that survive into
//! an edge bundle.
//! The manifest then describes every middleware and edge function: its
//! files, URL matchers, environment and regions.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::sorted_routes::sorted_routes;
use crate::analysis::{path_to_regex, MiddlewareConfig, MiddlewareMatcher};
use crate::bundler::{Compilation, EdgeMeta, Module, ModuleId, RouteMeta};
use crate::config::RewriteConfig;
use crate::entries::{Target, EDGE_RUNTIME};
use crate::error::{BuildError, BuildResult};
use crate::plugins::{CompilationPlugin, PluginContext, ProcessAssetsStage};
use crate::utils::normalize_app_path;

pub const MIDDLEWARE_MANIFEST: &str = "middleware-manifest.json";
pub const INTERCEPTION_ROUTE_REWRITE_MANIFEST: &str = "interception-route-rewrite-manifest";
pub const SERVER_REFERENCE_MANIFEST: &str = "server-reference-manifest";
pub const SUBRESOURCE_INTEGRITY_MANIFEST: &str = "subresource-integrity-manifest";
pub const DYNAMIC_CSS_MANIFEST: &str = "dynamic-css-manifest";
pub const MIDDLEWARE_BUILD_MANIFEST: &str = "middleware-build-manifest";
pub const MIDDLEWARE_REACT_LOADABLE_MANIFEST: &str = "middleware-react-loadable-manifest";
pub const FONT_MANIFEST: &str = "font-manifest";
pub const INSTRUMENTATION_HOOK_FILENAME: &str = "instrumentation";

const MANIFEST_VERSION: u32 = 3;

/// Header the router sends with the URL the client navigated from
pub const STRATA_URL_HEADER: &str = "Strata-Url";

pub const EDGE_ALLOW_DYNAMIC_USED: &str = "STRATA_EDGE_ALLOW_DYNAMIC_USED";

/// Packages that contain `eval` which never runs
const KNOWN_SAFE_DYNAMIC_PACKAGES: [&str; 1] = ["function-bind"];

static REGENERATOR_RUNTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"node_modules[\\/]regenerator-runtime[\\/]runtime\.js").expect("valid regex"));

const INTERCEPTION_ROUTE_MARKERS: [&str; 4] = ["(..)(..)", "(.)", "(..)", "(...)"];

/// What the edge compiler knows about one of its entries
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    pub edge: Option<EdgeMeta>,
    pub route: Option<RouteMeta>,
    pub regions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBinding {
    pub name: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeFunctionDefinition {
    pub files: Vec<String>,
    pub name: String,
    pub page: String,
    pub matchers: Vec<MiddlewareMatcher>,
    pub wasm: Vec<AssetBinding>,
    pub assets: Vec<AssetBinding>,
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareManifest {
    pub version: u32,
    pub middleware: BTreeMap<String, EdgeFunctionDefinition>,
    pub functions: BTreeMap<String, EdgeFunctionDefinition>,
    pub sorted_middleware: Vec<String>,
}

impl Default for MiddlewareManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            middleware: BTreeMap::new(),
            functions: BTreeMap::new(),
            sorted_middleware: Vec::new(),
        }
    }
}

/// A header condition of a rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteHas {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
}

/// A rewrite the edge router applies for intercepting routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterceptionRewrite {
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has: Vec<RewriteHas>,
}

/// Whether any segment of an app path starts with an interception marker
pub fn is_interception_route(path: &str) -> bool {
    path.split('/')
        .any(|segment| INTERCEPTION_ROUTE_MARKERS.iter().any(|marker| segment.starts_with(marker)))
}

/// Split an interception app path into the route that intercepts and the
/// route that gets intercepted
pub fn interception_route_information(app_path: &str) -> BuildResult<(String, String)> {
    let invalid = |reason: &str| {
        BuildError::conflict(
            app_path,
            format!("Invalid interception route: {}. {}", app_path, reason),
        )
    };

    let marker = app_path
        .split('/')
        .find_map(|segment| INTERCEPTION_ROUTE_MARKERS.iter().find(|marker| segment.starts_with(*marker)))
        .ok_or_else(|| invalid("Must be in the format /<intercepting route>/(..|...|..)(..)/<intercepted route>"))?;
    let (intercepting, intercepted) = app_path
        .split_once(marker)
        .ok_or_else(|| invalid("Missing interception marker"))?;
    let intercepting = normalize_app_path(intercepting);

    let intercepted = match *marker {
        "(.)" if intercepting == "/" => format!("/{}", intercepted),
        "(.)" => format!("{}/{}", intercepting, intercepted),
        "(..)" => {
            if intercepting == "/" {
                return Err(invalid("Cannot use (..) marker at the root level, use (.) instead."));
            }
            let (parent, _) = intercepting.rsplit_once('/').unwrap_or(("", ""));
            format!("{}/{}", parent, intercepted)
        }
        "(...)" => format!("/{}", intercepted),
        _ => {
            let segments: Vec<&str> = intercepting.split('/').collect();
            if segments.len() <= 2 {
                return Err(invalid("Cannot use (..)(..) marker at the root level or one level up."));
            }
            format!("{}/{}", segments[..segments.len() - 2].join("/"), intercepted)
        }
    };

    Ok((intercepting, intercepted))
}

/// `[id]` -> `:id`, `[...slug]` and `[[...slug]]` -> `:slug*`
fn to_path_to_regexp_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
                return segment.to_string();
            };
            let inner = inner.trim_start_matches('[').trim_end_matches(']');
            match inner.strip_prefix("...") {
                Some(rest) => format!(":{}*", rest),
                None => {
                    let name: String = inner
                        .chars()
                        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
                        .collect();
                    format!(":{}", name)
                }
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Configured rewrites into interception routes, followed by one rewrite
/// per intercepting app route
pub fn interception_rewrites(
    app_pages: &[String],
    rewrites: &[RewriteConfig],
) -> BuildResult<Vec<InterceptionRewrite>> {
    let mut result: Vec<InterceptionRewrite> = rewrites
        .iter()
        .filter(|rewrite| is_interception_route(&rewrite.destination))
        .map(|rewrite| InterceptionRewrite {
            source: rewrite.source.clone(),
            destination: rewrite.destination.clone(),
            has: Vec::new(),
        })
        .collect();

    for app_path in app_pages.iter().filter(|path| is_interception_route(path)) {
        let (intercepting, intercepted) = interception_route_information(app_path)?;
        let intercepting_source = if intercepting == "/" {
            "/(.*)?".to_string()
        } else {
            format!("{}/(.*)?", to_path_to_regexp_path(&intercepting))
        };
        let header_regex = path_to_regex(&intercepting_source).map_err(|reason| BuildError::conflict(app_path, reason))?;
        let header_regex = header_regex.strip_prefix('^').unwrap_or(&header_regex);
        let header_regex = header_regex.strip_suffix('$').unwrap_or(header_regex);

        result.push(InterceptionRewrite {
            source: to_path_to_regexp_path(&intercepted),
            destination: to_path_to_regexp_path(app_path),
            has: vec![RewriteHas {
                kind: "header".to_string(),
                key: STRATA_URL_HEADER.to_string(),
                value: header_regex.to_string(),
            }],
        });
    }

    Ok(result)
}

/// `self.__INTERCEPTION_ROUTE_REWRITE_MANIFEST=<json string>`
pub fn interception_manifest_source(rewrites: &[InterceptionRewrite]) -> BuildResult<String> {
    let json = serde_json::to_string(rewrites)?;
    Ok(format!(
        "self.__INTERCEPTION_ROUTE_REWRITE_MANIFEST={}",
        serde_json::to_string(&json)?
    ))
}

/// Regex escaping as the runtime's router does it
fn escape_regex(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if "|\\{}()[]^$+*?.-".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Named capture group key from a parameter name
fn route_key(name: &str, used: &mut HashSet<String>) -> String {
    let mut key: String = name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
    let invalid = key.is_empty() || key.len() > 30 || key.starts_with(|c: char| c.is_ascii_digit());
    if invalid || used.contains(&key) {
        key = (0u32..)
            .map(|n| {
                let mut generated = String::new();
                let mut n = n;
                loop {
                    generated.insert(0, (b'a' + (n % 26) as u8) as char);
                    if n < 26 {
                        break;
                    }
                    n = n / 26 - 1;
                }
                generated
            })
            .find(|candidate| !used.contains(candidate))
            .unwrap_or_default();
    }
    used.insert(key.clone());
    key
}

/// Anchored regex with named groups matching a route; with `catch_all`
/// it also matches every path below the route
pub fn named_middleware_regex(route: &str, catch_all: bool) -> String {
    let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return if catch_all { "^/.*$".to_string() } else { "^/$".to_string() };
    }

    let mut used = HashSet::new();
    let mut named = String::new();
    for segment in segments {
        let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
            named.push('/');
            named.push_str(&escape_regex(segment));
            continue;
        };
        let (inner, optional) = match inner.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner) => (inner, true),
            None => (inner, false),
        };
        let (name, repeat) = match inner.strip_prefix("...") {
            Some(name) => (name, true),
            None => (inner, false),
        };
        let key = route_key(name, &mut used);
        match (repeat, optional) {
            (true, true) => named.push_str(&format!("(?:/(?<{}>.+?))?", key)),
            (true, false) => named.push_str(&format!("/(?<{}>.+?)", key)),
            _ => named.push_str(&format!("/(?<{}>[^/]+?)", key)),
        }
    }

    format!("^{}{}$", named, if catch_all { "(?:(/.*)?)" } else { "" })
}

struct EntryFileOptions {
    dev: bool,
    sri_enabled: bool,
    has_instrumentation: bool,
}

/// Files an edge function needs, relative to the build output
fn entry_files(files: &[String], metadata: &EntryMetadata, options: &EntryFileOptions) -> Vec<String> {
    let mut result = Vec::new();

    if let Some(EdgeMeta::Ssr {
        is_server_component,
        is_app_dir,
        ..
    }) = &metadata.edge
    {
        if *is_server_component {
            result.push(format!("server/{}.js", SERVER_REFERENCE_MANIFEST));
            if options.sri_enabled {
                result.push(format!("server/{}.js", SUBRESOURCE_INTEGRITY_MANIFEST));
            }
            result.extend(
                files
                    .iter()
                    .filter(|file| file.starts_with("app/") && !file.ends_with(".hot-update.js"))
                    .map(|file| {
                        let stem = file.strip_suffix(".js").unwrap_or(file);
                        format!("server/{}_{}.js", stem, super::CLIENT_REFERENCE_MANIFEST)
                    }),
            );
        }
        if !options.dev && !*is_app_dir {
            result.push(format!("server/{}.js", DYNAMIC_CSS_MANIFEST));
        }
        for manifest in [
            MIDDLEWARE_BUILD_MANIFEST,
            MIDDLEWARE_REACT_LOADABLE_MANIFEST,
            FONT_MANIFEST,
            INTERCEPTION_ROUTE_REWRITE_MANIFEST,
        ] {
            result.push(format!("server/{}.js", manifest));
        }
    }

    if options.has_instrumentation {
        result.push(format!("server/edge-{}.js", INSTRUMENTATION_HOOK_FILENAME));
    }

    result.extend(
        files
            .iter()
            .filter(|file| !file.ends_with(".hot-update.js"))
            .map(|file| format!("server/{}", file)),
    );
    result
}

fn is_edge_entry(compilation: &Compilation, name: &str) -> bool {
    compilation
        .entry(name)
        .map_or(false, |entry| entry.descriptor.runtime.as_deref() == Some(EDGE_RUNTIME))
}

/// Every module an entry reaches, entry modules first
fn entry_modules(compilation: &Compilation, name: &str) -> Vec<ModuleId> {
    let Some(entry) = compilation.entry(name) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<ModuleId> = entry.modules.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        queue.extend(compilation.graph.connections(id).iter().map(|c| c.module));
    }
    order
}

/// Edge metadata, route settings and regions of every edge entry
pub fn extract_metadata(compilation: &Compilation) -> BTreeMap<String, EntryMetadata> {
    let mut metadata_by_entry = BTreeMap::new();

    for name in compilation.entries.keys().filter(|name| is_edge_entry(compilation, name)) {
        let modules = entry_modules(compilation, name);
        let mut metadata = EntryMetadata::default();

        for &id in &modules {
            let Some(module) = compilation.graph.module(id) else { continue };
            if metadata.route.is_none() {
                metadata.route = compilation.build_info.route(&module.identifier).map(|(route, _)| route);
            }
            if metadata.edge.is_none() {
                metadata.edge = compilation.build_info.edge(&module.identifier);
            }
        }

        if let Some(route) = &metadata.route {
            metadata.regions = route
                .preferred_region
                .clone()
                .or_else(|| route.middleware_config.regions.clone());
        }
        metadata_by_entry.insert(name.clone(), metadata);
    }

    metadata_by_entry
}

/// Which allow-list let an unsafe construct through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllowListMatch {
    KnownPackage,
    Pattern,
}

impl AllowListMatch {
    fn as_str(&self) -> &'static str {
        match self {
            AllowListMatch::KnownPackage => "knownPackage",
            AllowListMatch::Pattern => "unstable_allowDynamic",
        }
    }
}

fn allow_list_match(file_name: &str, config: &MiddlewareConfig, root_dir: &str) -> Option<AllowListMatch> {
    if KNOWN_SAFE_DYNAMIC_PACKAGES
        .iter()
        .any(|pkg| file_name.contains(&format!("/node_modules/{}/", pkg)))
    {
        return Some(AllowListMatch::KnownPackage);
    }

    let patterns = config.unstable_allow_dynamic.as_ref()?;
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("Ignoring unstable_allowDynamic pattern {}: {}", pattern, e),
        }
    }
    let name = file_name.strip_prefix(root_dir).unwrap_or(file_name);
    builder
        .build()
        .map_or(false, |set| set.is_match(name))
        .then_some(AllowListMatch::Pattern)
}

/// An edge entry and the settings of the route it was created for
struct EdgeEntryScope {
    config: MiddlewareConfig,
    root_dir: String,
    page_path: String,
    modules: Vec<ModuleId>,
}

fn edge_entry_scopes(compilation: &Compilation) -> Vec<EdgeEntryScope> {
    compilation
        .entries
        .keys()
        .filter(|name| is_edge_entry(compilation, name))
        .map(|name| {
            let modules = entry_modules(compilation, name);
            let route = modules
                .iter()
                .filter_map(|&id| compilation.graph.module(id))
                .find_map(|module| compilation.build_info.route(&module.identifier));
            match route {
                Some((meta, root_dir)) => EdgeEntryScope {
                    config: meta.middleware_config,
                    root_dir: root_dir.unwrap_or_default(),
                    page_path: meta.absolute_page_path,
                    modules,
                },
                None => EdgeEntryScope {
                    config: MiddlewareConfig::default(),
                    root_dir: String::new(),
                    page_path: String::new(),
                    modules,
                },
            }
        })
        .collect()
}

fn module_file(module: &Module) -> String {
    module
        .resource
        .as_deref()
        .map(|path| crate::utils::normalize_path_sep(&path.to_string_lossy()))
        .unwrap_or_else(|| module.request.clone())
}

/// Unsafe constructs found in edge entries, sorted by the allow-list.
/// Failures are warnings in development and errors otherwise; allow-listed
/// user patterns stay visible as warnings.
#[derive(Default)]
struct SafetyReport {
    failures: Vec<BuildError>,
    allowed: Vec<BuildError>,
    telemetry: Vec<serde_json::Value>,
}

impl SafetyReport {
    fn flag(&mut self, compilation: &Compilation, scope: &EdgeEntryScope, file: &str, message: String) {
        let allowed_by = allow_list_match(file, &scope.config, &scope.root_dir);
        if scope.config.unstable_allow_dynamic.is_some() || allowed_by.is_some() {
            self.telemetry.push(json!({
                "file": scope.page_path.strip_prefix(&scope.root_dir).unwrap_or(&scope.page_path),
                "config": scope.config,
                "fileWithDynamicCode": file.strip_prefix(&scope.root_dir).unwrap_or(file),
                "allowList": allowed_by.map(|by| by.as_str()),
            }));
        }

        let module = compilation.relative_resource(std::path::Path::new(file));
        match allowed_by {
            Some(AllowListMatch::KnownPackage) => debug!("{} in {} is allowed", message, file),
            Some(AllowListMatch::Pattern) => self.allowed.push(BuildError::UnsafeRuntimeConstruct {
                module,
                message,
                allow_listed: true,
            }),
            None => self.failures.push(BuildError::UnsafeRuntimeConstruct {
                module,
                message,
                allow_listed: false,
            }),
        }
    }

    fn apply(self, compilation: &mut Compilation) {
        for payload in self.telemetry {
            compilation.record_telemetry(EDGE_ALLOW_DYNAMIC_USED, payload);
        }
        compilation.warnings.extend(self.allowed);
        if compilation.dev {
            compilation.warnings.extend(self.failures);
        } else {
            compilation.errors.extend(self.failures);
        }
    }
}

/// Flag dynamic code evaluation that stays reachable in edge entries
pub fn check_dynamic_code(compilation: &mut Compilation) {
    let mut report = SafetyReport::default();

    for scope in edge_entry_scopes(compilation) {
        let mut seen = HashSet::new();
        for &id in &scope.modules {
            let Some(module) = compilation.graph.module(id) else { continue };
            let Some(usage) = compilation.build_info.dynamic_eval(&module.identifier) else {
                continue;
            };
            if !usage.is_used(module.used_exports.as_ref()) || !seen.insert(module.identifier.clone()) {
                continue;
            }
            if REGENERATOR_RUNTIME.is_match(&module.identifier) {
                continue;
            }

            let used_by = usage.export_names();
            let mut message = "Dynamic Code Evaluation (e. g. 'eval', 'new Function', 'WebAssembly.compile') not allowed in Edge Runtime".to_string();
            if !used_by.is_empty() {
                message.push_str(&format!("\nUsed by {}", used_by.join(", ")));
            }
            report.flag(compilation, &scope, &module_file(module), message);
        }
    }

    report.apply(compilation);
}

/// Flag Node.js globals and builtin modules used in edge entries
pub fn check_unsupported_apis(compilation: &mut Compilation) {
    let mut report = SafetyReport::default();

    for scope in edge_entry_scopes(compilation) {
        let mut seen = HashSet::new();
        for &id in &scope.modules {
            let Some(module) = compilation.graph.module(id) else { continue };
            if !seen.insert(module.identifier.clone()) {
                continue;
            }
            let file = module_file(module);
            for construct in compilation.build_info.unsupported_apis(&module.identifier) {
                if let Some(message) = construct.node_message() {
                    report.flag(compilation, &scope, &file, message);
                }
            }
        }
    }

    report.apply(compilation);
}

/// The manifest for an edge compilation
pub fn middleware_manifest(compilation: &Compilation, cx: &PluginContext) -> BuildResult<MiddlewareManifest> {
    let mut manifest = MiddlewareManifest::default();
    let options = EntryFileOptions {
        dev: cx.dev,
        sri_enabled: cx.config.experimental.sri.is_some(),
        has_instrumentation: compilation.entries.contains_key(INSTRUMENTATION_HOOK_FILENAME),
    };

    for (name, metadata) in extract_metadata(compilation) {
        let Some(edge) = &metadata.edge else { continue };
        let page = edge.page().to_string();
        let is_app_dir = matches!(edge, EdgeMeta::Ssr { is_app_dir: true, .. });
        let matcher_source = if is_app_dir { normalize_app_path(&page) } else { page.clone() };
        let catch_all = matches!(edge, EdgeMeta::Middleware { .. });

        let matchers = match edge {
            EdgeMeta::Middleware {
                matchers: Some(matchers),
                ..
            } => matchers.clone(),
            _ => vec![MiddlewareMatcher {
                regexp: named_middleware_regex(&matcher_source, catch_all),
                original_source: if page == "/" && catch_all {
                    "/:path*".to_string()
                } else {
                    matcher_source.clone()
                },
                locale: None,
                has: None,
                missing: None,
            }],
        };

        let definition = EdgeFunctionDefinition {
            files: entry_files(&compilation.entry_files(&name), &metadata, &options),
            name: name.clone(),
            page: page.clone(),
            matchers,
            wasm: Vec::new(),
            assets: Vec::new(),
            env: cx.config.edge.env.clone(),
            regions: metadata.regions.clone(),
        };
        if edge.is_edge_function() {
            manifest.functions.insert(page, definition);
        } else {
            manifest.middleware.insert(page, definition);
        }
    }

    manifest.sorted_middleware = sorted_routes(manifest.middleware.keys())?;
    Ok(manifest)
}

/// Checks edge bundles and emits the middleware manifest
#[derive(Debug, Default)]
pub struct MiddlewarePlugin;

#[async_trait]
impl CompilationPlugin for MiddlewarePlugin {
    fn name(&self) -> &str {
        "middleware"
    }

    fn applies_to(&self, target: Target) -> bool {
        target == Target::EdgeServer
    }

    async fn finish_modules(&self, compilation: &mut Compilation, _cx: &PluginContext) -> BuildResult<()> {
        check_dynamic_code(compilation);
        check_unsupported_apis(compilation);
        Ok(())
    }

    async fn process_assets(
        &self,
        stage: ProcessAssetsStage,
        compilation: &mut Compilation,
        cx: &PluginContext,
    ) -> BuildResult<()> {
        if stage != ProcessAssetsStage::Additions {
            return Ok(());
        }

        let rewrites = interception_rewrites(&cx.app_pages, &cx.config.rewrites)?;
        compilation.emit_asset(
            format!("{}.js", INTERCEPTION_ROUTE_REWRITE_MANIFEST),
            interception_manifest_source(&rewrites)?,
        );

        let manifest = middleware_manifest(compilation, cx)?;
        info!(
            "Middleware manifest: {} middleware, {} edge functions",
            manifest.middleware.len(),
            manifest.functions.len()
        );
        compilation.emit_asset(MIDDLEWARE_MANIFEST, serde_json::to_string_pretty(&manifest)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BuildInfo, CompiledEntry};
    use crate::config::Config;
    use crate::entries::{EntryDescriptor, EntryImport};
    use crate::routes::{RouteCollection, RouteDirs};
    use crate::transform::{analyze_edge_module, DynamicEval};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_named_middleware_regex() {
        assert_eq!(named_middleware_regex("/", true), "^/.*$");
        assert_eq!(named_middleware_regex("/", false), "^/$");
        assert_eq!(named_middleware_regex("/api/hello", false), "^/api/hello$");
        assert_eq!(
            named_middleware_regex("/blog/[slug]", false),
            "^/blog/(?<slug>[^/]+?)$"
        );
        assert_eq!(
            named_middleware_regex("/docs/[[...path]]", false),
            "^/docs(?:/(?<path>.+?))?$"
        );
        assert_eq!(
            named_middleware_regex("/shop/[...all]", true),
            "^/shop/(?<all>.+?)(?:(/.*)?)$"
        );
        assert_eq!(named_middleware_regex("/a.b/[x-y]", false), "^/a\\.b/(?<xy>[^/]+?)$");
    }

    #[test]
    fn test_named_regex_compiles() {
        let re = Regex::new(&named_middleware_regex("/blog/[slug]", false)).unwrap();
        let captures = re.captures("/blog/hello").unwrap();
        assert_eq!(captures.name("slug").unwrap().as_str(), "hello");
    }

    #[test]
    fn test_interception_information() {
        assert_eq!(
            interception_route_information("/feed/@modal/(..)photo/[id]").unwrap(),
            ("/feed".to_string(), "/photo/[id]".to_string())
        );
        assert_eq!(
            interception_route_information("/feed/(.)photo").unwrap(),
            ("/feed".to_string(), "/feed/photo".to_string())
        );
        assert_eq!(
            interception_route_information("/a/b/(...)photo").unwrap(),
            ("/a/b".to_string(), "/photo".to_string())
        );
        assert_eq!(
            interception_route_information("/a/b/c/(..)(..)photo").unwrap(),
            ("/a/b/c".to_string(), "/a/photo".to_string())
        );
        assert!(interception_route_information("/(..)photo").is_err());
    }

    #[test]
    fn test_interception_rewrites() {
        let rewrites = vec![
            RewriteConfig {
                source: "/old".into(),
                destination: "/new".into(),
            },
            RewriteConfig {
                source: "/p/:id".into(),
                destination: "/feed/(.)p/:id".into(),
            },
        ];
        let result = interception_rewrites(&["/feed/(..)photo/[id]".to_string(), "/feed".to_string()], &rewrites).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].source, "/p/:id");
        assert_eq!(result[1].source, "/photo/:id");
        assert_eq!(result[1].destination, "/feed/(..)photo/:id");
        assert_eq!(result[1].has[0].key, STRATA_URL_HEADER);

        let source = interception_manifest_source(&[]).unwrap();
        assert_eq!(source, "self.__INTERCEPTION_ROUTE_REWRITE_MANIFEST=\"[]\"");
    }

    fn metadata(edge: EdgeMeta) -> EntryMetadata {
        EntryMetadata {
            edge: Some(edge),
            ..EntryMetadata::default()
        }
    }

    #[test]
    fn test_entry_files() {
        let files = vec!["app/page.js".to_string(), "app/page.hot-update.js".to_string()];
        let options = EntryFileOptions {
            dev: false,
            sri_enabled: false,
            has_instrumentation: true,
        };
        let ssr = metadata(EdgeMeta::Ssr {
            page: "/page".into(),
            is_server_component: true,
            is_app_dir: true,
        });
        assert_eq!(
            entry_files(&files, &ssr, &options),
            vec![
                "server/server-reference-manifest.js",
                "server/app/page_client-reference-manifest.js",
                "server/middleware-build-manifest.js",
                "server/middleware-react-loadable-manifest.js",
                "server/font-manifest.js",
                "server/interception-route-rewrite-manifest.js",
                "server/edge-instrumentation.js",
                "server/app/page.js",
            ]
        );

        let middleware = metadata(EdgeMeta::Middleware {
            page: "/".into(),
            matchers: None,
        });
        let options = EntryFileOptions {
            has_instrumentation: false,
            ..options
        };
        assert_eq!(
            entry_files(&["middleware.js".to_string()], &middleware, &options),
            vec!["server/middleware.js"]
        );
    }

    /// An edge compilation with one entry whose loader reaches `source_module`
    fn edge_compilation(dev: bool, loader_info: Vec<BuildInfo>, eval: Option<DynamicEval>) -> Compilation {
        let mut compilation = Compilation::new(Target::EdgeServer, dev, "/project");
        let loader = compilation
            .graph
            .add_module(Module::new("loader", "strata-middleware-loader?x!", None));
        for info in loader_info {
            compilation.build_info.record("loader", info);
        }

        let mut lib = Module::new("/project/lib/run.js", "/project/lib/run.js", None);
        lib.resource = Some(PathBuf::from("/project/lib/run.js"));
        let lib = compilation.graph.add_module(lib);
        compilation.graph.connect(loader, lib, "./lib/run", false);
        if let Some(eval) = eval {
            compilation.build_info.record("/project/lib/run.js", BuildInfo::DynamicEval(eval));
        }

        let mut descriptor = EntryDescriptor::new(
            "middleware",
            "/middleware",
            RouteCollection::Root,
            vec![EntryImport::Module("/project/middleware.ts".into())],
        );
        descriptor.runtime = Some(EDGE_RUNTIME.to_string());
        let mut chunk = crate::bundler::Chunk::new(Some("middleware".into()));
        chunk.files.push("middleware.js".into());
        let chunk = compilation.chunks.add_chunk(chunk);
        let group = compilation.chunks.add_group(Some("middleware".into()), vec![chunk]);
        compilation.entries.insert(
            "middleware".into(),
            CompiledEntry {
                descriptor,
                group,
                modules: vec![loader],
            },
        );
        compilation
    }

    fn route_info(config: MiddlewareConfig) -> BuildInfo {
        BuildInfo::Route {
            route: RouteMeta {
                page: "/middleware".into(),
                absolute_page_path: "/project/middleware.ts".into(),
                preferred_region: None,
                middleware_config: config,
            },
            root_dir: Some("/project".into()),
        }
    }

    #[test]
    fn test_dynamic_code_is_an_error_in_production() {
        let mut compilation = edge_compilation(false, vec![route_info(MiddlewareConfig::default())], Some(DynamicEval::Always));
        check_dynamic_code(&mut compilation);
        assert_eq!(compilation.errors.len(), 1);
        let message = compilation.errors[0].to_string();
        assert!(message.starts_with("./lib/run.js: Dynamic Code Evaluation"), "{}", message);

        let mut dev = edge_compilation(true, vec![route_info(MiddlewareConfig::default())], Some(DynamicEval::Always));
        check_dynamic_code(&mut dev);
        assert!(dev.errors.is_empty());
        assert_eq!(dev.warnings.len(), 1);
    }

    #[test]
    fn test_dynamic_code_in_unused_export_is_ignored() {
        let eval = DynamicEval::Exports(["unused".to_string()].into_iter().collect());
        let mut compilation = edge_compilation(false, vec![route_info(MiddlewareConfig::default())], Some(eval));
        let lib = compilation.graph.find("/project/lib/run.js").unwrap();
        compilation.graph.module_mut(lib).unwrap().used_exports = Some(["run".to_string()].into_iter().collect());
        check_dynamic_code(&mut compilation);
        assert!(compilation.errors.is_empty());
    }

    #[test]
    fn test_allow_dynamic_glob() {
        let config = MiddlewareConfig {
            unstable_allow_dynamic: Some(vec!["/lib/**".to_string()]),
            ..MiddlewareConfig::default()
        };
        let mut compilation = edge_compilation(false, vec![route_info(config)], Some(DynamicEval::Always));
        check_dynamic_code(&mut compilation);
        assert!(compilation.errors.is_empty());
        assert_eq!(compilation.warnings.len(), 1);
        assert!(matches!(
            compilation.warnings[0],
            BuildError::UnsafeRuntimeConstruct { allow_listed: true, .. }
        ));
        assert_eq!(compilation.telemetry.len(), 1);
        assert_eq!(compilation.telemetry[0].event_name, EDGE_ALLOW_DYNAMIC_USED);
        assert_eq!(compilation.telemetry[0].payload["fileWithDynamicCode"], "/lib/run.js");
        assert_eq!(compilation.telemetry[0].payload["allowList"], "unstable_allowDynamic");
    }

    #[test]
    fn test_known_safe_package_is_recorded() {
        assert_eq!(
            allow_list_match(
                "/project/node_modules/function-bind/implementation.js",
                &MiddlewareConfig::default(),
                "/project"
            ),
            Some(AllowListMatch::KnownPackage)
        );
        assert_eq!(
            allow_list_match("/project/lib/run.js", &MiddlewareConfig::default(), "/project"),
            None
        );

        let mut compilation = edge_compilation(false, vec![route_info(MiddlewareConfig::default())], None);
        let mut bind = Module::new(
            "/project/node_modules/function-bind/implementation.js",
            "/project/node_modules/function-bind/implementation.js",
            None,
        );
        bind.resource = Some(PathBuf::from("/project/node_modules/function-bind/implementation.js"));
        let bind = compilation.graph.add_module(bind);
        let loader = compilation.graph.find("loader").unwrap();
        compilation.graph.connect(loader, bind, "function-bind", false);
        compilation.build_info.record(
            "/project/node_modules/function-bind/implementation.js",
            BuildInfo::DynamicEval(DynamicEval::Always),
        );

        check_dynamic_code(&mut compilation);
        assert!(compilation.errors.is_empty());
        assert!(compilation.warnings.is_empty());
        assert_eq!(compilation.telemetry.len(), 1);
        assert_eq!(compilation.telemetry[0].payload["allowList"], "knownPackage");
    }

    fn with_node_apis(dev: bool, config: MiddlewareConfig) -> Compilation {
        let compilation = edge_compilation(dev, vec![route_info(config)], None);
        let analysis = analyze_edge_module("import fs from 'fs';\nsetImmediate(() => {});\n");
        compilation
            .build_info
            .record("/project/lib/run.js", BuildInfo::UnsupportedApis(analysis.unsupported_apis()));
        compilation
    }

    #[test]
    fn test_node_apis_fail_production_builds() {
        let mut compilation = with_node_apis(false, MiddlewareConfig::default());
        check_unsupported_apis(&mut compilation);
        assert_eq!(compilation.errors.len(), 2);
        assert!(compilation.warnings.is_empty());
        let message = compilation.errors[0].to_string();
        assert_eq!(
            message,
            "./lib/run.js: A Node.js module is loaded ('fs' at line 1) which is not supported in the Edge Runtime."
        );
        assert!(compilation.errors[1].to_string().contains("setImmediate at line: 2"));
    }

    #[test]
    fn test_node_apis_warn_in_development() {
        let mut compilation = with_node_apis(true, MiddlewareConfig::default());
        check_unsupported_apis(&mut compilation);
        assert!(compilation.errors.is_empty());
        assert_eq!(compilation.warnings.len(), 2);
        assert!(matches!(
            compilation.warnings[0],
            BuildError::UnsafeRuntimeConstruct { allow_listed: false, .. }
        ));
    }

    #[test]
    fn test_node_apis_respect_allow_list() {
        let config = MiddlewareConfig {
            unstable_allow_dynamic: Some(vec!["/lib/*.js".to_string()]),
            ..MiddlewareConfig::default()
        };
        let mut compilation = with_node_apis(false, config);
        check_unsupported_apis(&mut compilation);
        assert!(compilation.errors.is_empty());
        assert_eq!(compilation.warnings.len(), 2);
        assert_eq!(compilation.telemetry.len(), 2);
    }

    fn plugin_context() -> PluginContext {
        let config = Config::default_config();
        PluginContext {
            dirs: RouteDirs::from_config(&config),
            config: Arc::new(config),
            dev: false,
            client_references: Default::default(),
            app_pages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_manifest_for_middleware() {
        let mut compilation = edge_compilation(
            false,
            vec![
                route_info(MiddlewareConfig::default()),
                BuildInfo::Edge(EdgeMeta::Middleware {
                    page: "/".into(),
                    matchers: None,
                }),
            ],
            None,
        );
        let cx = plugin_context();
        let plugin = MiddlewarePlugin;
        plugin.finish_modules(&mut compilation, &cx).await.unwrap();
        for stage in ProcessAssetsStage::ALL {
            plugin.process_assets(stage, &mut compilation, &cx).await.unwrap();
        }

        let manifest: serde_json::Value = serde_json::from_str(&compilation.assets[MIDDLEWARE_MANIFEST]).unwrap();
        assert_eq!(manifest["version"], 3);
        assert_eq!(manifest["sortedMiddleware"], json!(["/"]));
        let definition = &manifest["middleware"]["/"];
        assert_eq!(definition["name"], "middleware");
        assert_eq!(definition["files"], json!(["server/middleware.js"]));
        assert_eq!(
            definition["matchers"],
            json!([{ "regexp": "^/.*$", "originalSource": "/:path*" }])
        );
        assert!(compilation
            .assets
            .contains_key("interception-route-rewrite-manifest.js"));
    }
}
