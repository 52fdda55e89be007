//! Static info extraction
//!
//! Reads exported configuration from a route file without executing it:
//! runtime target, revalidation window, preferred region, segment config,
//! middleware matchers and server/client component classification.

mod layouts;
mod literal;
pub mod matchers;
pub mod scan;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::cache::{get_json, set_json, CacheKey, IncrementalCache};
use crate::error::{BuildError, BuildResult};
use crate::routes::{is_api_route, is_instrumentation_hook_file, is_middleware_file};
use crate::utils::{normalize_app_path, normalize_page_path};

pub use layouts::static_info_including_layouts;
pub use literal::UnsupportedLiteral;
pub use matchers::{parse_middleware_config, path_to_regex, MiddlewareConfig, MiddlewareMatcher};
pub use scan::{client_module_label, scan_module, Directive, ScannedModule};

/// Exports understood as app segment configuration
pub const APP_SEGMENT_CONFIG_KEYS: [&str; 8] = [
    "revalidate",
    "dynamicParams",
    "dynamic",
    "fetchCache",
    "preferredRegion",
    "runtime",
    "maxDuration",
    "experimental_ppr",
];

/// Exports understood as pages configuration
pub const PAGES_SEGMENT_CONFIG_KEYS: [&str; 2] = ["runtime", "maxDuration"];

const DYNAMIC_MODES: [&str; 4] = ["auto", "error", "force-static", "force-dynamic"];
const FETCH_CACHE_MODES: [&str; 7] = [
    "auto",
    "default-cache",
    "only-cache",
    "force-cache",
    "force-no-store",
    "default-no-store",
    "only-no-store",
];

/// Raised when a module exports both kinds of data functions
pub const SERVER_PROPS_SSG_CONFLICT: &str =
    "You can not use getStaticProps or getStaticPaths with getServerSideProps. To use SSG, please remove getServerSideProps";

/// Which routing model a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    App,
    Pages,
    Root,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::App => "app",
            PageType::Pages => "pages",
            PageType::Root => "root",
        }
    }
}

/// Declared server runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerRuntime {
    #[serde(rename = "nodejs")]
    NodeJs,
    #[serde(rename = "edge")]
    Edge,
    #[serde(rename = "experimental-edge")]
    ExperimentalEdge,
}

impl ServerRuntime {
    pub fn is_edge(&self) -> bool {
        matches!(self, ServerRuntime::Edge | ServerRuntime::ExperimentalEdge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRuntime::NodeJs => "nodejs",
            ServerRuntime::Edge => "edge",
            ServerRuntime::ExperimentalEdge => "experimental-edge",
        }
    }
}

impl FromStr for ServerRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodejs" => Ok(ServerRuntime::NodeJs),
            "edge" => Ok(ServerRuntime::Edge),
            "experimental-edge" => Ok(ServerRuntime::ExperimentalEdge),
            other => Err(format!(
                "Invalid enum value. Expected 'nodejs' | 'edge' | 'experimental-edge', received '{}'",
                other
            )),
        }
    }
}

/// Whether an optional runtime is edge-like
pub fn is_edge_runtime(runtime: Option<ServerRuntime>) -> bool {
    runtime.map_or(false, |runtime| runtime.is_edge())
}

/// Revalidation window: `false` or a number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revalidate {
    Never,
    Seconds(u64),
}

impl Serialize for Revalidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Revalidate::Never => serializer.serialize_bool(false),
            Revalidate::Seconds(seconds) => serializer.serialize_u64(*seconds),
        }
    }
}

impl<'de> Deserialize<'de> for Revalidate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Revalidate::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl Revalidate {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(false) => Ok(Revalidate::Never),
            Value::Number(n) => n
                .as_u64()
                .map(Revalidate::Seconds)
                .ok_or_else(|| format!("revalidate must be a non-negative integer, received {}", n)),
            other => Err(format!("revalidate must be false or a number, received {}", other)),
        }
    }
}

/// Server/client component classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RscModuleType {
    Client,
    Server,
}

/// Segment configuration merged along the layout chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revalidate: Option<Revalidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_params: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_cache: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_region: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "experimental_ppr")]
    pub experimental_ppr: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<ServerRuntime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u64>,
}

impl SegmentConfig {
    /// Apply a nearer segment on top of this one. Unset fields never override.
    pub fn merge(&mut self, nearer: &SegmentConfig) {
        fn apply<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        apply(&mut self.revalidate, &nearer.revalidate);
        apply(&mut self.dynamic, &nearer.dynamic);
        apply(&mut self.dynamic_params, &nearer.dynamic_params);
        apply(&mut self.fetch_cache, &nearer.fetch_cache);
        apply(&mut self.preferred_region, &nearer.preferred_region);
        apply(&mut self.experimental_ppr, &nearer.experimental_ppr);
        apply(&mut self.runtime, &nearer.runtime);
        apply(&mut self.max_duration, &nearer.max_duration);
    }

    /// Reduce root-first segments into one config
    pub fn reduce<'a>(segments: impl IntoIterator<Item = &'a SegmentConfig>) -> SegmentConfig {
        segments.into_iter().fold(SegmentConfig::default(), |mut merged, segment| {
            merged.merge(segment);
            merged
        })
    }
}

/// Everything statically known about one route file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticInfo {
    pub page_type: PageType,
    pub runtime: Option<ServerRuntime>,
    pub revalidate: Option<Revalidate>,
    pub preferred_region: Option<Vec<String>>,
    pub max_duration: Option<u64>,
    pub config: SegmentConfig,
    pub middleware: Option<MiddlewareConfig>,
    pub rsc: Option<RscModuleType>,
    #[serde(default)]
    pub get_static_props: bool,
    #[serde(default)]
    pub get_server_side_props: bool,
    #[serde(default)]
    pub generate_static_params: bool,
    #[serde(default)]
    pub generate_image_metadata: bool,
    #[serde(default)]
    pub generate_sitemaps: bool,
}

impl StaticInfo {
    pub fn empty(page_type: PageType) -> Self {
        Self {
            page_type,
            runtime: None,
            revalidate: None,
            preferred_region: None,
            max_duration: None,
            config: SegmentConfig::default(),
            middleware: None,
            rsc: None,
            get_static_props: false,
            get_server_side_props: false,
            generate_static_params: false,
            generate_image_metadata: false,
            generate_sitemaps: false,
        }
    }

    pub fn is_edge(&self) -> bool {
        is_edge_runtime(self.runtime)
    }
}

/// One extraction request
#[derive(Debug, Clone, Copy)]
pub struct StaticInfoRequest<'a> {
    pub page_file_path: &'a Path,
    pub page: &'a str,
    pub page_type: PageType,
    pub dev: bool,
}

impl fmt::Display for StaticInfoRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.page, self.page_file_path.display())
    }
}

/// Extract static info from source text
pub fn analyze_source(source: &str, request: &StaticInfoRequest<'_>) -> BuildResult<StaticInfo> {
    if !scan::might_have_static_info(source) {
        return Ok(StaticInfo::empty(request.page_type));
    }

    let module = scan_module(source);

    let gssp = module.has_export("getServerSideProps");
    let gsp = module.has_export("getStaticProps");
    if gssp && (gsp || module.has_export("getStaticPaths")) {
        return Err(BuildError::conflict(request.page, SERVER_PROPS_SSG_CONFLICT));
    }

    let rsc = if client_module_label(source).is_some() || module.is_client() {
        RscModuleType::Client
    } else {
        RscModuleType::Server
    };

    match request.page_type {
        PageType::App => analyze_app(&module, rsc, request),
        PageType::Pages | PageType::Root => analyze_pages(&module, rsc, request),
    }
}

fn analyze_app(module: &ScannedModule, rsc: RscModuleType, request: &StaticInfoRequest<'_>) -> BuildResult<StaticInfo> {
    let generate_static_params = module.has_export("generateStaticParams");
    let route = normalize_app_path(request.page);

    let mut config = SegmentConfig::default();
    for key in APP_SEGMENT_CONFIG_KEYS {
        warn_if_reexported(module, key, request);
        let Some(value) = exported_value(module, key, request)? else {
            continue;
        };
        if let Err(reason) = apply_segment_value(&mut config, key, &value) {
            report_unsupported(request, key, format!("{} on route \"{}\"", reason, route))?;
        }
    }

    if is_edge_runtime(config.runtime) && generate_static_params {
        return Err(BuildError::conflict(
            request.page,
            format!(
                "Page \"{}\" cannot use both `export const runtime = 'edge'` and export `generateStaticParams`.",
                request.page
            ),
        ));
    }

    if module.is_client() && generate_static_params {
        return Err(BuildError::conflict(
            request.page,
            format!(
                "Page \"{}\" cannot use both \"use client\" and export function \"generateStaticParams()\".",
                request.page
            ),
        ));
    }

    let middleware = middleware_config(module, request)?;

    Ok(StaticInfo {
        page_type: PageType::App,
        runtime: config.runtime,
        revalidate: config.revalidate,
        preferred_region: config.preferred_region.clone(),
        max_duration: config.max_duration,
        middleware,
        rsc: Some(rsc),
        generate_static_params,
        generate_image_metadata: module.has_export("generateImageMetadata"),
        generate_sitemaps: module.has_export("generateSitemaps"),
        config,
        ..StaticInfo::empty(PageType::App)
    })
}

fn analyze_pages(module: &ScannedModule, rsc: RscModuleType, request: &StaticInfoRequest<'_>) -> BuildResult<StaticInfo> {
    let gssp = module.has_export("getServerSideProps");
    let gsp = module.has_export("getStaticProps");
    let route = normalize_page_path(request.page);
    let is_api = is_api_route(&route);

    let mut config = SegmentConfig::default();
    for key in PAGES_SEGMENT_CONFIG_KEYS {
        warn_if_reexported(module, key, request);
        let Some(value) = exported_value(module, key, request)? else {
            continue;
        };
        if let Err(reason) = apply_segment_value(&mut config, key, &value) {
            report_unsupported(request, key, reason)?;
        }
    }

    // `export const config = { runtime, regions, maxDuration }`
    let raw_config = exported_value(module, "config", request)?;
    let mut nested = SegmentConfig::default();
    if let Some(Value::Object(object)) = &raw_config {
        for (key, field) in [("runtime", "runtime"), ("maxDuration", "maxDuration"), ("regions", "preferredRegion")] {
            if let Some(value) = object.get(key) {
                if let Err(reason) = apply_segment_value(&mut nested, field, value) {
                    report_unsupported(request, "config", format!("{} at \"config.{}\"", reason, key))?;
                }
            }
        }
    }

    let declared = config.runtime.or(nested.runtime);
    let runtime = if is_edge_runtime(declared) || gssp || gsp {
        declared
    } else {
        None
    };

    let is_special = is_middleware_file(request.page) || is_instrumentation_hook_file(request.page);

    if runtime == Some(ServerRuntime::ExperimentalEdge) {
        if is_api {
            warn!("{} provided runtime 'experimental-edge'. It can be updated to 'edge' instead.", request.page);
        } else {
            warn!("You are using an experimental edge runtime, the API might change.");
        }
    }

    if runtime == Some(ServerRuntime::Edge) && !is_api && !is_special && request.page_type == PageType::Pages {
        let message = format!(
            "Page {} provided runtime 'edge', the edge runtime for rendering is currently experimental. Use runtime 'experimental-edge' instead.",
            request.page
        );
        if request.dev {
            error!("{}", message);
        } else {
            return Err(BuildError::conflict(request.page, message));
        }
    }

    let middleware = match &raw_config {
        Some(raw) => Some(parse_config_object(raw, request)?),
        None => None,
    };

    Ok(StaticInfo {
        page_type: request.page_type,
        runtime,
        preferred_region: nested.preferred_region.clone(),
        max_duration: config.max_duration.or(nested.max_duration),
        config,
        middleware,
        rsc: Some(rsc),
        get_static_props: gsp,
        get_server_side_props: gssp,
        ..StaticInfo::empty(request.page_type)
    })
}

fn middleware_config(module: &ScannedModule, request: &StaticInfoRequest<'_>) -> BuildResult<Option<MiddlewareConfig>> {
    match exported_value(module, "config", request)? {
        Some(raw) => parse_config_object(&raw, request).map(Some),
        None => Ok(None),
    }
}

fn parse_config_object(raw: &Value, request: &StaticInfoRequest<'_>) -> BuildResult<MiddlewareConfig> {
    parse_middleware_config(raw).map_err(|(reason, path)| BuildError::UnsupportedValue {
        page: request.page.to_string(),
        export: "config".to_string(),
        reason: format!("{} contains invalid middleware config: {} at \"{}\"", request.page, reason, path),
    })
}

fn exported_value(module: &ScannedModule, key: &str, request: &StaticInfoRequest<'_>) -> BuildResult<Option<Value>> {
    match module.const_value(key) {
        Ok(value) => Ok(value),
        Err(unsupported) => {
            report_unsupported(request, key, unsupported.to_string())?;
            Ok(None)
        }
    }
}

fn warn_if_reexported(module: &ScannedModule, key: &str, request: &StaticInfoRequest<'_>) {
    if module.exports.get(key) == Some(&scan::ExportKind::Specifier) {
        warn!(
            "Strata can't recognize the exported `{}` field in \"{}\", it may be re-exported from another file. The default config will be used instead.",
            key, request.page
        );
    }
}

// Development keeps going with defaults; production fails the route
fn report_unsupported(request: &StaticInfoRequest<'_>, export: &str, reason: String) -> BuildResult<()> {
    if request.dev {
        warn!(
            "Strata can't recognize the exported `{}` field in route \"{}\": {}",
            export, request.page, reason
        );
        Ok(())
    } else {
        Err(BuildError::UnsupportedValue {
            page: request.page.to_string(),
            export: export.to_string(),
            reason,
        })
    }
}

fn apply_segment_value(config: &mut SegmentConfig, key: &str, value: &Value) -> Result<(), String> {
    let as_string = |value: &Value| {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| format!("expected string, received {}", value))
    };

    match key {
        "revalidate" => config.revalidate = Some(Revalidate::from_value(value)?),
        "dynamicParams" => {
            config.dynamic_params = Some(value.as_bool().ok_or_else(|| format!("expected boolean, received {}", value))?)
        }
        "dynamic" => {
            let mode = as_string(value)?;
            if !DYNAMIC_MODES.contains(&mode.as_str()) {
                return Err(format!("Invalid enum value. Expected one of {:?}, received '{}'", DYNAMIC_MODES, mode));
            }
            config.dynamic = Some(mode);
        }
        "fetchCache" => {
            let mode = as_string(value)?;
            if !FETCH_CACHE_MODES.contains(&mode.as_str()) {
                return Err(format!("Invalid enum value. Expected one of {:?}, received '{}'", FETCH_CACHE_MODES, mode));
            }
            config.fetch_cache = Some(mode);
        }
        "preferredRegion" => {
            config.preferred_region = Some(match value {
                Value::Array(items) => items.iter().map(as_string).collect::<Result<_, _>>()?,
                other => vec![as_string(other)?],
            })
        }
        "experimental_ppr" => {
            config.experimental_ppr =
                Some(value.as_bool().ok_or_else(|| format!("expected boolean, received {}", value))?)
        }
        "runtime" => config.runtime = Some(as_string(value)?.parse()?),
        "maxDuration" => {
            config.max_duration = Some(
                value
                    .as_u64()
                    .ok_or_else(|| format!("maxDuration must be a non-negative integer, received {}", value))?,
            )
        }
        _ => {}
    }
    Ok(())
}

/// Reads route files and extracts their static info, optionally through a cache
#[derive(Clone, Default)]
pub struct StaticInfoExtractor {
    cache: Option<Arc<dyn IncrementalCache>>,
}

impl fmt::Debug for StaticInfoExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticInfoExtractor")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl StaticInfoExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<dyn IncrementalCache>) -> Self {
        Self { cache: Some(cache) }
    }

    /// Extract static info for one file.
    ///
    /// A missing file is empty in development and an error otherwise.
    pub async fn extract(&self, request: StaticInfoRequest<'_>) -> BuildResult<StaticInfo> {
        let source = match tokio::fs::read_to_string(request.page_file_path).await {
            Ok(source) => source,
            Err(e) if request.dev => {
                debug!("Could not read {}: {}", request, e);
                return Ok(StaticInfo::empty(request.page_type));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(cache) = &self.cache else {
            return analyze_source(&source, &request);
        };

        let key = CacheKey::derive(
            "static-info",
            [
                request.page_file_path.to_string_lossy().as_bytes(),
                request.page.as_bytes(),
                request.page_type.as_str().as_bytes(),
                if request.dev { b"dev".as_slice() } else { b"prod".as_slice() },
                source.as_bytes(),
            ],
        );

        if let Some(info) = get_json::<StaticInfo, _>(cache.as_ref(), &key).await {
            debug!("Static info cache hit for {}", request);
            return Ok(info);
        }

        let info = analyze_source(&source, &request)?;
        set_json(cache.as_ref(), &key, &info).await;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use pretty_assertions::assert_eq;

    fn request(page: &str, page_type: PageType, dev: bool) -> StaticInfoRequest<'_> {
        StaticInfoRequest {
            page_file_path: Path::new("/project/file.tsx"),
            page,
            page_type,
            dev,
        }
    }

    #[test]
    fn test_fast_path_skips_plain_modules() {
        let info = analyze_source("export default function Page() {}", &request("/page", PageType::App, false)).unwrap();
        assert_eq!(info, StaticInfo::empty(PageType::App));
    }

    #[test]
    fn test_app_segment_config() {
        let source = r#"
            export const runtime = 'edge'
            export const revalidate = false
            export const preferredRegion = ['iad1', 'sfo1']
            export const dynamic = 'force-dynamic'
            export const maxDuration = 30
        "#;
        let info = analyze_source(source, &request("/blog/page", PageType::App, false)).unwrap();

        assert_eq!(info.runtime, Some(ServerRuntime::Edge));
        assert_eq!(info.revalidate, Some(Revalidate::Never));
        assert_eq!(info.preferred_region, Some(vec!["iad1".to_string(), "sfo1".to_string()]));
        assert_eq!(info.config.dynamic.as_deref(), Some("force-dynamic"));
        assert_eq!(info.max_duration, Some(30));
        assert_eq!(info.rsc, Some(RscModuleType::Server));
    }

    #[test]
    fn test_ssg_and_ssr_conflict_in_either_order() {
        let orders = [
            "export async function getStaticProps() {}\nexport async function getServerSideProps() {}",
            "export async function getServerSideProps() {}\nexport async function getStaticProps() {}",
            "export const getServerSideProps = async () => ({})\nexport function getStaticPaths() {}",
            "export function getStaticPaths() {}\nexport { getServerSideProps } from './data'",
        ];

        for source in orders {
            for page_type in [PageType::Pages, PageType::App] {
                let err = analyze_source(source, &request("/blog", page_type, true)).unwrap_err();
                assert!(matches!(err, BuildError::ConfigConflict { .. }), "{}", source);
                assert!(err.to_string().contains(SERVER_PROPS_SSG_CONFLICT));
            }
        }
    }

    #[test]
    fn test_app_conflicts() {
        let edge = "export const runtime = 'edge'\nexport async function generateStaticParams() { return [] }";
        let err = analyze_source(edge, &request("/[id]/page", PageType::App, true)).unwrap_err();
        assert!(err.to_string().contains("cannot use both `export const runtime = 'edge'`"));

        let client = "'use client'\nexport function generateStaticParams() { return [] }";
        let err = analyze_source(client, &request("/[id]/page", PageType::App, true)).unwrap_err();
        assert!(err.to_string().contains("\"use client\""));
    }

    #[test]
    fn test_pages_runtime_rules() {
        // nodejs without a data function is not honoured
        let info = analyze_source("export const runtime = 'nodejs'", &request("/about", PageType::Pages, false)).unwrap();
        assert_eq!(info.runtime, None);

        let info = analyze_source(
            "export const config = { runtime: 'experimental-edge', regions: 'iad1', maxDuration: 10 }",
            &request("/about", PageType::Pages, false),
        )
        .unwrap();
        assert_eq!(info.runtime, Some(ServerRuntime::ExperimentalEdge));
        assert_eq!(info.preferred_region, Some(vec!["iad1".to_string()]));
        assert_eq!(info.max_duration, Some(10));

        let edge_page = "export const runtime = 'edge'";
        assert!(analyze_source(edge_page, &request("/about", PageType::Pages, false)).is_err());
        assert!(analyze_source(edge_page, &request("/about", PageType::Pages, true)).is_ok());
        let api = analyze_source(edge_page, &request("/api/hello", PageType::Pages, false)).unwrap();
        assert_eq!(api.runtime, Some(ServerRuntime::Edge));
    }

    #[test]
    fn test_unsupported_value_depends_on_mode() {
        let source = "export const revalidate = getRevalidate()";
        let err = analyze_source(source, &request("/page", PageType::App, false)).unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedValue { ref export, .. } if export == "revalidate"));

        let info = analyze_source(source, &request("/page", PageType::App, true)).unwrap();
        assert_eq!(info.revalidate, None);
    }

    #[test]
    fn test_middleware_config_and_client_classification() {
        let source = "export const config = { matcher: ['/dashboard/:path*'], regions: ['iad1'] }";
        let info = analyze_source(source, &request("/middleware", PageType::Root, false)).unwrap();
        let middleware = info.middleware.unwrap();
        assert_eq!(middleware.matchers.unwrap()[0].original_source, "/dashboard/:path*");
        assert_eq!(middleware.regions, Some(vec!["iad1".to_string()]));

        let info = analyze_source("'use client'\nexport const dynamic = 'auto'", &request("/page", PageType::App, false)).unwrap();
        assert_eq!(info.rsc, Some(RscModuleType::Client));
    }

    #[test]
    fn test_segment_merge_only_overrides_set_fields() {
        let root = SegmentConfig {
            runtime: Some(ServerRuntime::Edge),
            revalidate: Some(Revalidate::Seconds(60)),
            ..SegmentConfig::default()
        };
        let middle = SegmentConfig {
            revalidate: Some(Revalidate::Seconds(10)),
            dynamic_params: Some(true),
            ..SegmentConfig::default()
        };
        let leaf = SegmentConfig {
            dynamic_params: Some(false),
            ..SegmentConfig::default()
        };

        let merged = SegmentConfig::reduce([&root, &middle, &leaf]);
        assert_eq!(merged.runtime, Some(ServerRuntime::Edge));
        assert_eq!(merged.revalidate, Some(Revalidate::Seconds(10)));
        assert_eq!(merged.dynamic_params, Some(false));
    }

    #[tokio::test]
    async fn test_extractor_caches_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.tsx");
        std::fs::write(&file, "export const revalidate = 5").unwrap();

        let cache = Arc::new(MemoryCache::new());
        let extractor = StaticInfoExtractor::with_cache(cache.clone());
        let request = StaticInfoRequest {
            page_file_path: &file,
            page: "/page",
            page_type: PageType::App,
            dev: false,
        };

        let first = extractor.extract(request).await.unwrap();
        let second = extractor.extract(request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.revalidate, Some(Revalidate::Seconds(5)));
        assert_eq!(cache.len(), 1);

        std::fs::write(&file, "export const revalidate = 7").unwrap();
        let third = extractor.extract(request).await.unwrap();
        assert_eq!(third.revalidate, Some(Revalidate::Seconds(7)));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_only_in_dev() {
        let extractor = StaticInfoExtractor::new();
        let missing = Path::new("/definitely/missing/page.tsx");
        let dev = StaticInfoRequest {
            page_file_path: missing,
            page: "/page",
            page_type: PageType::App,
            dev: true,
        };
        assert_eq!(extractor.extract(dev).await.unwrap(), StaticInfo::empty(PageType::App));
        assert!(extractor.extract(StaticInfoRequest { dev: false, ..dev }).await.is_err());
    }
}
