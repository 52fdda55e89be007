//! Virtual module loader options
//!
//! Each entry is a request for a virtual module: a template name plus the
//! options that template is instantiated with. Options are plain serde
//! structs carrying a schema version. They only become a string when they
//! cross into the bundler's request syntax, where the JSON payload is
//! base64 encoded inside an urlencoded query.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize, Serializer};

use crate::analysis::{MiddlewareConfig, MiddlewareMatcher};
use crate::error::{BuildError, BuildResult};
use crate::routes::RouteCollection;

/// Bumped whenever an options struct changes shape
pub const LOADER_OPTIONS_VERSION: u32 = 1;

/// Template of browser entries built from server-side client references
pub const FLIGHT_CLIENT_ENTRY_LOADER: &str = "strata-flight-client-entry-loader";

/// Options for the app-collection server loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppLoaderOptions {
    pub name: String,
    pub page: String,
    /// Aliased source path of the page
    pub page_path: String,
    pub app_dir: String,
    /// Every app path that normalizes to the same route, sorted
    pub app_paths: Vec<String>,
    pub page_extensions: Vec<String>,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPagesLoaderOptions {
    pub absolute_page_path: String,
    pub page: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteKind {
    Pages,
    PagesApi,
}

/// `_app` and `_document` sources a pages route renders with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialPages {
    pub app: Option<String>,
    pub document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLoaderOptions {
    pub kind: RouteKind,
    pub page: String,
    pub absolute_page_path: String,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
    pub special_pages: Option<SpecialPages>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAppRouteLoaderOptions {
    pub absolute_page_path: String,
    pub page: String,
    pub app_loader: Box<AppLoaderOptions>,
    pub env: BTreeMap<String, String>,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareLoaderOptions {
    pub absolute_page_path: String,
    pub page: String,
    pub root_dir: String,
    pub matchers: Option<Vec<MiddlewareMatcher>>,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFunctionLoaderOptions {
    pub absolute_page_path: String,
    pub page: String,
    pub root_dir: String,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

/// Server rendering inside the edge sandbox, for pages and app pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSsrLoaderOptions {
    pub absolute_500_path: Option<String>,
    pub absolute_app_path: Option<String>,
    pub absolute_document_path: Option<String>,
    pub absolute_error_path: Option<String>,
    pub absolute_page_path: String,
    pub dev: bool,
    pub is_server_component: bool,
    pub page: String,
    pub pages_type: RouteCollection,
    pub app_loader: Option<Box<AppLoaderOptions>>,
    pub sri_enabled: bool,
    pub env: BTreeMap<String, String>,
    pub preferred_region: Option<Vec<String>>,
    pub middleware_config: MiddlewareConfig,
}

/// A client component imported across the server boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleRequest {
    /// Absolute path of the client module
    pub request: String,
    /// Exports the server side references, `*` for all
    pub ids: Vec<String>,
}

/// Browser entry collecting the client components of one app segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightClientEntryLoaderOptions {
    pub page: String,
    pub modules: Vec<ClientModuleRequest>,
    /// Whether the entry is for the server compilers' SSR layer
    pub server: bool,
}

/// A virtual module template and its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "loader")]
pub enum LoaderOptions {
    #[serde(rename = "strata-app-loader")]
    App(AppLoaderOptions),
    #[serde(rename = "strata-client-pages-loader")]
    ClientPages(ClientPagesLoaderOptions),
    #[serde(rename = "strata-route-loader")]
    Route(RouteLoaderOptions),
    #[serde(rename = "strata-edge-app-route-loader")]
    EdgeAppRoute(EdgeAppRouteLoaderOptions),
    #[serde(rename = "strata-middleware-loader")]
    Middleware(MiddlewareLoaderOptions),
    #[serde(rename = "strata-edge-function-loader")]
    EdgeFunction(EdgeFunctionLoaderOptions),
    #[serde(rename = "strata-edge-ssr-loader")]
    EdgeSsr(EdgeSsrLoaderOptions),
    #[serde(rename = "strata-flight-client-entry-loader")]
    FlightClientEntry(FlightClientEntryLoaderOptions),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(flatten)]
    options: LoaderOptions,
}

impl LoaderOptions {
    /// Virtual module template id
    pub fn template(&self) -> &'static str {
        match self {
            LoaderOptions::App(_) => "strata-app-loader",
            LoaderOptions::ClientPages(_) => "strata-client-pages-loader",
            LoaderOptions::Route(_) => "strata-route-loader",
            LoaderOptions::EdgeAppRoute(_) => "strata-edge-app-route-loader",
            LoaderOptions::Middleware(_) => "strata-middleware-loader",
            LoaderOptions::EdgeFunction(_) => "strata-edge-function-loader",
            LoaderOptions::EdgeSsr(_) => "strata-edge-ssr-loader",
            LoaderOptions::FlightClientEntry(_) => FLIGHT_CLIENT_ENTRY_LOADER,
        }
    }

    pub fn page(&self) -> &str {
        match self {
            LoaderOptions::App(o) => &o.page,
            LoaderOptions::ClientPages(o) => &o.page,
            LoaderOptions::Route(o) => &o.page,
            LoaderOptions::EdgeAppRoute(o) => &o.page,
            LoaderOptions::Middleware(o) => &o.page,
            LoaderOptions::EdgeFunction(o) => &o.page,
            LoaderOptions::EdgeSsr(o) => &o.page,
            LoaderOptions::FlightClientEntry(o) => &o.page,
        }
    }

    /// Aliased path of the user module the template wraps. Client entries
    /// wrap several modules and have none.
    pub fn absolute_page_path(&self) -> &str {
        match self {
            LoaderOptions::App(o) => &o.page_path,
            LoaderOptions::ClientPages(o) => &o.absolute_page_path,
            LoaderOptions::Route(o) => &o.absolute_page_path,
            LoaderOptions::EdgeAppRoute(o) => &o.absolute_page_path,
            LoaderOptions::Middleware(o) => &o.absolute_page_path,
            LoaderOptions::EdgeFunction(o) => &o.absolute_page_path,
            LoaderOptions::EdgeSsr(o) => &o.absolute_page_path,
            LoaderOptions::FlightClientEntry(_) => "",
        }
    }

    /// Ordered query pairs: version, page, then the base64 JSON payload
    pub fn query_pairs(&self) -> BuildResult<Vec<(&'static str, String)>> {
        let payload = serde_json::to_vec(&Envelope {
            version: LOADER_OPTIONS_VERSION,
            options: self.clone(),
        })?;

        Ok(vec![
            ("v", LOADER_OPTIONS_VERSION.to_string()),
            ("page", self.page().to_string()),
            ("options", STANDARD.encode(payload)),
        ])
    }

    /// `<template>?<query>!`
    pub fn to_request(&self) -> BuildResult<String> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.query_pairs()? {
            query.append_pair(key, &value);
        }
        Ok(format!("{}?{}!", self.template(), query.finish()))
    }

    /// Decode a request produced by [`to_request`](Self::to_request)
    pub fn from_request(request: &str) -> BuildResult<Self> {
        let request = request.strip_suffix('!').unwrap_or(request);
        let (template, query) = request
            .split_once('?')
            .ok_or_else(|| BuildError::Internal(format!("Loader request without options: {}", request)))?;

        let payload = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "options")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| BuildError::Internal(format!("Loader request without options: {}", template)))?;

        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| BuildError::Internal(format!("Malformed loader options for {}: {}", template, e)))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;

        if envelope.version != LOADER_OPTIONS_VERSION {
            return Err(BuildError::Internal(format!(
                "Loader options version {} is not supported (expected {})",
                envelope.version, LOADER_OPTIONS_VERSION
            )));
        }
        if envelope.options.template() != template {
            return Err(BuildError::Internal(format!(
                "Loader options for {} were sent to {}",
                envelope.options.template(),
                template
            )));
        }

        Ok(envelope.options)
    }
}

/// One import of an entry: a virtual module or a plain module path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryImport {
    Loader(LoaderOptions),
    Module(String),
}

impl EntryImport {
    pub fn request(&self) -> BuildResult<String> {
        match self {
            EntryImport::Loader(options) => options.to_request(),
            EntryImport::Module(path) => Ok(path.clone()),
        }
    }

    pub fn loader(&self) -> Option<&LoaderOptions> {
        match self {
            EntryImport::Loader(options) => Some(options),
            EntryImport::Module(_) => None,
        }
    }
}

impl Serialize for EntryImport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let request = self.request().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn middleware_options() -> LoaderOptions {
        LoaderOptions::Middleware(MiddlewareLoaderOptions {
            absolute_page_path: "private-next-root-dir/middleware.ts".to_string(),
            page: "/middleware".to_string(),
            root_dir: "/project".to_string(),
            matchers: Some(vec![MiddlewareMatcher::catch_all()]),
            preferred_region: None,
            middleware_config: MiddlewareConfig::default(),
        })
    }

    #[test]
    fn test_request_shape() {
        let request = middleware_options().to_request().unwrap();
        assert!(request.starts_with("strata-middleware-loader?v=1&page=%2Fmiddleware&options="));
        assert!(request.ends_with('!'));
    }

    #[test]
    fn test_request_decodes_to_same_options() {
        let options = middleware_options();
        let decoded = LoaderOptions::from_request(&options.to_request().unwrap()).unwrap();
        assert_eq!(decoded, options);
    }

    #[test]
    fn test_mismatched_template_is_internal_error() {
        let request = middleware_options().to_request().unwrap();
        let forged = request.replacen("strata-middleware-loader", "strata-edge-function-loader", 1);
        assert!(matches!(LoaderOptions::from_request(&forged), Err(BuildError::Internal(_))));
    }

    #[test]
    fn test_module_imports_serialize_as_paths() {
        let json = serde_json::to_string(&EntryImport::Module("strata/dist/client/router".to_string())).unwrap();
        assert_eq!(json, "\"strata/dist/client/router\"");
    }
}
