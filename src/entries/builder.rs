//! Entry creation for discovered routes

use std::collections::BTreeMap;
use std::path::Path;

use futures_util::future::join_all;
use tracing::{debug, error, info};

use super::loader::{
    AppLoaderOptions, ClientPagesLoaderOptions, EdgeAppRouteLoaderOptions, EdgeFunctionLoaderOptions,
    EdgeSsrLoaderOptions, MiddlewareLoaderOptions, RouteKind, RouteLoaderOptions, SpecialPages,
};
use super::{classify, runtime_entries, EntryDescriptor, EntryImport, Entrypoints, Layer, LoaderOptions, Target};
use crate::analysis::{
    static_info_including_layouts, MiddlewareMatcher, PageType, RscModuleType, StaticInfo, StaticInfoExtractor,
    StaticInfoRequest,
};
use crate::config::Config;
use crate::error::{BuildError, BuildResult};
use crate::routes::{
    is_api_route, is_app_route_route, is_instrumentation_hook_file, is_middleware_file, page_file_path,
    page_from_path, resolve_page_alias, DiscoveredRoutes, PageSource, PagesMapping, RouteCollection, RouteDirs,
    APP_DIR_ALIAS,
};
use crate::utils::{normalize_app_path, normalize_page_path};

const CLIENT_ROUTER_MODULE: &str = "strata/dist/client/router";
const INSTRUMENTATION_HOOK_FILENAME: &str = "instrumentation";

/// A route left out of the build
#[derive(Debug)]
pub struct RouteFailure {
    pub page: String,
    pub collection: RouteCollection,
    pub error: BuildError,
}

/// Entries produced for one route
#[derive(Debug, Default)]
struct RouteEntries {
    entries: Vec<(Target, EntryDescriptor)>,
    middleware_matchers: Option<Vec<MiddlewareMatcher>>,
}

/// Creates entries for every discovered route
pub struct EntryBuilder<'a> {
    config: &'a Config,
    dirs: &'a RouteDirs,
    extractor: &'a StaticInfoExtractor,
    dev: bool,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(config: &'a Config, dirs: &'a RouteDirs, extractor: &'a StaticInfoExtractor, dev: bool) -> Self {
        Self {
            config,
            dirs,
            extractor,
            dev,
        }
    }

    fn page_extensions(&self) -> &[String] {
        &self.config.page_extensions
    }

    /// Create the entries for every route.
    ///
    /// Routes are processed concurrently. A route-level failure drops that
    /// route and is recorded in [`Entrypoints::failures`]; anything else
    /// aborts.
    pub async fn create_entrypoints(&self, routes: &DiscoveredRoutes) -> BuildResult<Entrypoints> {
        let app_paths_per_route = routes
            .app
            .as_ref()
            .filter(|_| self.dirs.app_dir.is_some())
            .map(|app| self.app_paths_per_route(app))
            .unwrap_or_default();
        let pages = routes.pages.clone().unwrap_or_default();

        let mut work = Vec::new();
        if let Some(app) = &routes.app {
            work.extend(app.iter().map(|(page, alias)| (RouteCollection::App, page, alias)));
        }
        work.extend(routes.root.iter().map(|(page, alias)| (RouteCollection::Root, page, alias)));
        if let Some(pages) = &routes.pages {
            work.extend(pages.iter().map(|(page, alias)| (RouteCollection::Pages, page, alias)));
        }

        let results = join_all(work.iter().map(|(collection, page, alias)| {
            self.route_entries(page, alias, *collection, &app_paths_per_route, &pages)
        }))
        .await;

        let mut entrypoints = Entrypoints::default();
        for ((collection, page, _), result) in work.iter().zip(results) {
            let outcome = result.and_then(|route| {
                if route.middleware_matchers.is_some() {
                    entrypoints.middleware_matchers = route.middleware_matchers;
                }
                route
                    .entries
                    .into_iter()
                    .try_for_each(|(target, entry)| entrypoints.insert(target, entry))
            });

            match outcome {
                Ok(()) => {}
                Err(error) if error.is_route_scoped() => {
                    error!("Failed to create entries for {}: {}", page, error);
                    entrypoints.failures.push(RouteFailure {
                        page: page.to_string(),
                        collection: *collection,
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        // An edge compiler holding only the instrumentation hook has nothing to serve
        if entrypoints.edge_server.len() == 1 && entrypoints.edge_server.contains_key(INSTRUMENTATION_HOOK_FILENAME) {
            entrypoints.edge_server.remove(INSTRUMENTATION_HOOK_FILENAME);
        }

        for entry in runtime_entries(self.dirs.app_dir.is_some(), self.dev) {
            entrypoints.client.insert(entry.name.clone(), entry);
        }

        info!(
            "Created {} entries ({} client, {} server, {} edge)",
            entrypoints.len(),
            entrypoints.client.len(),
            entrypoints.server.len(),
            entrypoints.edge_server.len()
        );

        Ok(entrypoints)
    }

    /// Every app path grouped by the route it normalizes to, sorted
    pub fn app_paths_per_route(&self, app: &PagesMapping) -> BTreeMap<String, Vec<String>> {
        let mut per_route: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (page, alias) in app {
            per_route
                .entry(normalize_app_path(page))
                .or_default()
                .push(page_from_path(alias, self.page_extensions()).replacen(APP_DIR_ALIAS, "", 1));
        }
        for paths in per_route.values_mut() {
            paths.sort();
        }
        per_route
    }

    async fn route_entries(
        &self,
        page: &str,
        alias: &str,
        collection: RouteCollection,
        app_paths_per_route: &BTreeMap<String, Vec<String>>,
        pages: &PagesMapping,
    ) -> BuildResult<RouteEntries> {
        let bundle_file = normalize_page_path(page);
        let client_bundle_path = format!("{}{}", collection.as_str(), bundle_file);
        let server_bundle_path = match collection {
            RouteCollection::Pages => format!("pages{}", bundle_file),
            RouteCollection::App => format!("app{}", bundle_file),
            RouteCollection::Root => bundle_file[1..].to_string(),
        };

        let (file_path, is_internal) = match resolve_page_alias(alias, self.dirs, self.page_extensions()) {
            PageSource::File(path) => (path, false),
            PageSource::Internal(_) => (page_file_path(alias, self.dirs), true),
        };
        let is_inside_app_dir = self
            .dirs
            .app_dir
            .as_deref()
            .map_or(false, |app_dir| {
                collection == RouteCollection::App || alias.starts_with(APP_DIR_ALIAS) || file_path.starts_with(app_dir)
            });

        let info = self.static_info(page, is_internal, &file_path, collection, is_inside_app_dir).await?;
        let is_server_component = is_inside_app_dir && info.rsc != Some(RscModuleType::Client);
        let is_instrumentation = collection == RouteCollection::Root && is_instrumentation_hook_file(page);

        let mut route = RouteEntries::default();
        if is_middleware_file(page) {
            route.middleware_matchers = Some(
                info.middleware
                    .as_ref()
                    .and_then(|middleware| middleware.matchers.clone())
                    .unwrap_or_else(|| vec![MiddlewareMatcher::catch_all()]),
            );
        }

        let app_loader = || -> Option<AppLoaderOptions> {
            let app_dir = self.dirs.app_dir.as_ref()?;
            (collection == RouteCollection::App).then(|| AppLoaderOptions {
                name: server_bundle_path.clone(),
                page: page.to_string(),
                page_path: alias.to_string(),
                app_dir: app_dir.to_string_lossy().into_owned(),
                app_paths: app_paths_per_route
                    .get(&normalize_app_path(page))
                    .cloned()
                    .unwrap_or_default(),
                page_extensions: self.page_extensions().to_vec(),
                preferred_region: info.preferred_region.clone(),
                middleware_config: info.middleware.clone().unwrap_or_default(),
            })
        };

        let targets = classify(page, collection, info.runtime);
        debug!("{} ({}) -> {:?}", page, collection.as_str(), targets.iter().collect::<Vec<_>>());

        if targets.client && !is_server_component && !is_inside_app_dir {
            let mut import = vec![EntryImport::Loader(LoaderOptions::ClientPages(ClientPagesLoaderOptions {
                absolute_page_path: alias.to_string(),
                page: page.to_string(),
            }))];
            if page == "/_app" {
                import.push(EntryImport::Module(CLIENT_ROUTER_MODULE.to_string()));
            }
            route.entries.push((
                Target::Client,
                EntryDescriptor::new(&client_bundle_path, page, collection, import),
            ));
        }

        if targets.server {
            let entry = if let Some(options) = app_loader() {
                EntryDescriptor::new(
                    &server_bundle_path,
                    page,
                    collection,
                    vec![EntryImport::Loader(LoaderOptions::App(options))],
                )
                .with_layer(Some(Layer::ReactServerComponents))
            } else if is_instrumentation {
                self.instrumentation_entry(&server_bundle_path, page, alias, false)
            } else if is_api_route(page) {
                let options = RouteLoaderOptions {
                    kind: RouteKind::PagesApi,
                    page: page.to_string(),
                    absolute_page_path: alias.to_string(),
                    preferred_region: info.preferred_region.clone(),
                    middleware_config: info.middleware.clone().unwrap_or_default(),
                    special_pages: None,
                };
                EntryDescriptor::new(
                    &server_bundle_path,
                    page,
                    collection,
                    vec![EntryImport::Loader(LoaderOptions::Route(options))],
                )
            } else if !is_middleware_file(page) && !is_internal && !is_non_route_pages_page(page) {
                let options = RouteLoaderOptions {
                    kind: RouteKind::Pages,
                    page: page.to_string(),
                    absolute_page_path: alias.to_string(),
                    preferred_region: info.preferred_region.clone(),
                    middleware_config: info.middleware.clone().unwrap_or_default(),
                    special_pages: Some(SpecialPages {
                        app: pages.get("/_app").cloned(),
                        document: pages.get("/_document").cloned(),
                    }),
                };
                EntryDescriptor::new(
                    &server_bundle_path,
                    page,
                    collection,
                    vec![EntryImport::Loader(LoaderOptions::Route(options))],
                )
            } else {
                EntryDescriptor::new(
                    &server_bundle_path,
                    page,
                    collection,
                    vec![EntryImport::Module(alias.to_string())],
                )
            };
            route.entries.push((Target::Server, mark_server_component(entry, is_server_component)));
        }

        if targets.edge {
            let entry = if is_instrumentation {
                self.instrumentation_entry(&server_bundle_path, page, alias, true)
            } else {
                self.edge_server_entry(EdgeEntryContext {
                    name: &server_bundle_path,
                    page,
                    alias,
                    collection,
                    info: &info,
                    is_server_component,
                    app_loader: app_loader(),
                    pages,
                })
            };
            route.entries.push((Target::EdgeServer, mark_server_component(entry, is_server_component)));
        }

        Ok(route)
    }

    async fn static_info(
        &self,
        page: &str,
        is_internal: bool,
        file_path: &Path,
        collection: RouteCollection,
        is_inside_app_dir: bool,
    ) -> BuildResult<StaticInfo> {
        let page_type = if is_inside_app_dir {
            PageType::App
        } else if collection == RouteCollection::Root {
            PageType::Root
        } else {
            PageType::Pages
        };

        if is_internal {
            return Ok(StaticInfo::empty(page_type));
        }

        static_info_including_layouts(
            self.extractor,
            StaticInfoRequest {
                page_file_path: file_path,
                page,
                page_type,
                dev: self.dev,
            },
            self.dirs.app_dir.as_deref().filter(|_| is_inside_app_dir),
            self.page_extensions(),
        )
        .await
    }

    fn instrumentation_entry(&self, server_bundle_path: &str, page: &str, alias: &str, edge: bool) -> EntryDescriptor {
        let filename = if edge {
            format!("edge-{}.js", INSTRUMENTATION_HOOK_FILENAME)
        } else if self.dev {
            format!("{}.js", INSTRUMENTATION_HOOK_FILENAME)
        } else {
            // Kept out of the chunks directory
            format!("../{}.js", INSTRUMENTATION_HOOK_FILENAME)
        };

        let mut entry = EntryDescriptor::new(
            server_bundle_path.replacen("src/", "", 1),
            page,
            RouteCollection::Root,
            vec![EntryImport::Module(alias.to_string())],
        )
        .with_layer(Some(Layer::Instrument));
        entry.filename = Some(filename);
        entry
    }

    fn edge_server_entry(&self, cx: EdgeEntryContext<'_>) -> EntryDescriptor {
        let EdgeEntryContext {
            name,
            page,
            alias,
            collection,
            info,
            is_server_component,
            app_loader,
            pages,
        } = cx;
        let middleware_config = info.middleware.clone().unwrap_or_default();
        let root_dir = self.dirs.root_dir.to_string_lossy().into_owned();

        let (options, layer) = match app_loader {
            Some(app_loader) if is_app_route_route(page) => (
                LoaderOptions::EdgeAppRoute(EdgeAppRouteLoaderOptions {
                    absolute_page_path: alias.to_string(),
                    page: page.to_string(),
                    app_loader: Box::new(app_loader),
                    env: self.config.edge.env.clone(),
                    preferred_region: info.preferred_region.clone(),
                    middleware_config,
                }),
                Some(Layer::ReactServerComponents),
            ),
            _ if is_middleware_file(page) => (
                LoaderOptions::Middleware(MiddlewareLoaderOptions {
                    absolute_page_path: alias.to_string(),
                    page: page.to_string(),
                    root_dir,
                    matchers: info.middleware.as_ref().and_then(|m| m.matchers.clone()),
                    preferred_region: info.preferred_region.clone(),
                    middleware_config,
                }),
                None,
            ),
            _ if is_api_route(page) => (
                LoaderOptions::EdgeFunction(EdgeFunctionLoaderOptions {
                    absolute_page_path: alias.to_string(),
                    page: page.to_string(),
                    root_dir,
                    preferred_region: info.preferred_region.clone(),
                    middleware_config,
                }),
                None,
            ),
            app_loader => {
                // Rendered in the SSR layer; the page module itself is moved
                // into the server components layer by a module rule
                let layer = app_loader.is_some().then_some(Layer::ServerSideRendering);
                let options = EdgeSsrLoaderOptions {
                    absolute_500_path: pages.get("/500").cloned(),
                    absolute_app_path: pages.get("/_app").cloned(),
                    absolute_document_path: pages.get("/_document").cloned(),
                    absolute_error_path: pages.get("/_error").cloned(),
                    absolute_page_path: alias.to_string(),
                    dev: self.dev,
                    is_server_component,
                    page: page.to_string(),
                    pages_type: collection,
                    app_loader: app_loader.map(Box::new),
                    sri_enabled: !self.dev && self.config.experimental.sri.is_some(),
                    env: self.config.edge.env.clone(),
                    preferred_region: info.preferred_region.clone(),
                    middleware_config,
                };
                (LoaderOptions::EdgeSsr(options), layer)
            }
        };

        EntryDescriptor::new(name, page, collection, vec![EntryImport::Loader(options)]).with_layer(layer)
    }
}

struct EdgeEntryContext<'a> {
    name: &'a str,
    page: &'a str,
    alias: &'a str,
    collection: RouteCollection,
    info: &'a StaticInfo,
    is_server_component: bool,
    app_loader: Option<AppLoaderOptions>,
    pages: &'a PagesMapping,
}

fn mark_server_component(mut entry: EntryDescriptor, is_server_component: bool) -> EntryDescriptor {
    entry.is_server_component = is_server_component;
    entry
}

/// Framework-provided fallbacks rather than user files
/// `_app` and `_document` are rendered around routes, never as routes
fn is_non_route_pages_page(page: &str) -> bool {
    page == "/_app" || page == "/_document"
}
