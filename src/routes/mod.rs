//! Route discovery
//!
//! Walks the configured source directories and produces, per route
//! collection, a deterministic map from logical route path to an aliased
//! source path.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::utils::{ensure_leading_slash, normalize_path_sep};

/// Alias prefix for files under the pages directory
pub const PAGES_DIR_ALIAS: &str = "private-next-pages";
/// Alias prefix for files under the app directory
pub const APP_DIR_ALIAS: &str = "private-next-app-dir";
/// Alias prefix for files at the project root
pub const ROOT_DIR_ALIAS: &str = "private-next-root-dir";

/// Reserved key for the app collection's not-found route
pub const NOT_FOUND_ROUTE: &str = "/_not-found";
/// Framework component used when the app collection has no not-found page
pub const DEFAULT_NOT_FOUND_COMPONENT: &str = "strata/dist/client/components/not-found-error";
/// Framework directory holding the default `_app`, `_error` and `_document`
pub const INTERNAL_PAGES_DIR: &str = "strata/dist/pages";
/// Prefix of every framework-provided component
pub const INTERNAL_COMPONENTS_DIR: &str = "strata/dist/";

const RESERVED_PAGES: [&str; 3] = ["/_app", "/_error", "/_document"];

/// Metadata route basenames and the extension their route key carries
const METADATA_ROUTES: [(&str, Option<&str>); 8] = [
    ("robots", Some("txt")),
    ("sitemap", Some("xml")),
    ("manifest", Some("webmanifest")),
    ("favicon", Some("ico")),
    ("icon", None),
    ("apple-icon", None),
    ("opengraph-image", None),
    ("twitter-image", None),
];

/// Logical route path to aliased source path
pub type PagesMapping = BTreeMap<String, String>;

/// One of the independent namespaces of route files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteCollection {
    /// `middleware` and `instrumentation` files at the project root
    Root,
    /// Pages-style routes
    Pages,
    /// App-style routes
    App,
}

impl RouteCollection {
    pub fn alias(&self) -> &'static str {
        match self {
            RouteCollection::Root => ROOT_DIR_ALIAS,
            RouteCollection::Pages => PAGES_DIR_ALIAS,
            RouteCollection::App => APP_DIR_ALIAS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCollection::Root => "root",
            RouteCollection::Pages => "pages",
            RouteCollection::App => "app",
        }
    }
}

/// A discovered route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Logical route path, e.g. `/blog/[slug]`
    pub page: String,

    /// Collection the route belongs to
    pub collection: RouteCollection,

    /// Aliased source path, e.g. `private-next-pages/blog/[slug].tsx`
    pub alias_path: String,

    /// Absolute source path (or the framework module for internal fallbacks)
    pub absolute_path: PathBuf,

    /// Declared page extension, empty for framework fallbacks
    pub extension: String,
}

/// Directories routes may live in
#[derive(Debug, Clone, Default)]
pub struct RouteDirs {
    pub root_dir: PathBuf,
    pub pages_dir: Option<PathBuf>,
    pub app_dir: Option<PathBuf>,
}

impl RouteDirs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_dir: config.root.clone(),
            pages_dir: config.pages_dir(),
            app_dir: config.app_dir(),
        }
    }
}

/// Strip the page extension and a trailing `/index` from a relative file path
pub fn page_from_path(page_path: &str, page_extensions: &[String]) -> String {
    let normalized = normalize_path_sep(page_path);
    let mut page = normalized.as_str();

    if let Some(ext) = page_extensions
        .iter()
        .find(|ext| page.ends_with(&format!(".{}", ext)))
    {
        page = page[..page.len() - ext.len()].trim_end_matches('.');
    }

    let page = page.strip_suffix("/index").unwrap_or(page);
    if page.is_empty() {
        "/".to_string()
    } else {
        page.to_string()
    }
}

fn split_extension(path: &str) -> (&str, &str) {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => path.split_at(file_start + dot),
        _ => (path, ""),
    }
}

/// Comparator ordering candidate files so the preferred extension comes last.
///
/// Files are grouped by their path without extension; within a group the
/// extension declared later in `page_extensions` sorts after earlier ones,
/// so inserting in order lets it override them.
pub fn sort_by_page_exts(page_extensions: &[String]) -> impl Fn(&String, &String) -> Ordering + '_ {
    move |a, b| {
        let (a_stem, a_ext) = split_extension(a);
        let (b_stem, b_ext) = split_extension(b);

        let index_of = |ext: &str| {
            page_extensions
                .iter()
                .position(|candidate| candidate == ext.trim_start_matches('.'))
        };

        a_stem
            .cmp(b_stem)
            .then_with(|| index_of(a_ext).cmp(&index_of(b_ext)))
    }
}

/// Recursively list route candidates under `dir` as `/`-prefixed relative paths.
///
/// An unreadable directory yields no candidates.
pub fn collect_page_paths(dir: &Path, page_extensions: &[String], collection: RouteCollection) -> Vec<String> {
    if let Err(e) = fs::read_dir(dir) {
        warn!("Skipping unreadable {} directory {}: {}", collection.as_str(), dir.display(), e);
        return Vec::new();
    }

    let mut paths = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_entry(|entry| {
        // `_private` folders never contribute app routes
        collection != RouteCollection::App
            || entry.depth() == 0
            || !entry.file_name().to_string_lossy().starts_with('_')
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative) = pathdiff::diff_paths(entry.path(), dir) else {
            continue;
        };
        let relative = ensure_leading_slash(&normalize_path_sep(&relative.to_string_lossy()));

        let has_extension = page_extensions
            .iter()
            .any(|ext| relative.ends_with(&format!(".{}", ext)));
        if !has_extension {
            continue;
        }

        if collection == RouteCollection::App && !is_app_router_file(&relative, page_extensions) {
            continue;
        }

        paths.push(relative);
    }

    paths
}

fn is_app_router_file(relative: &str, page_extensions: &[String]) -> bool {
    let page = page_from_path(relative, page_extensions);
    let last = page.rsplit('/').next().unwrap_or("");
    last == "page" || last == "route" || is_metadata_route_file(relative, page_extensions)
}

/// Whether a file in the app collection is a metadata route (`robots.ts`, `icon.tsx`, ...)
pub fn is_metadata_route_file(relative: &str, page_extensions: &[String]) -> bool {
    let page = page_from_path(relative, page_extensions);
    let last = page.rsplit('/').next().unwrap_or("");
    METADATA_ROUTES.iter().any(|(name, _)| *name == last)
}

/// Whether a normalized route (`/robots.txt/route`, `app/icon/route`) is a metadata route
pub fn is_metadata_route(route: &str) -> bool {
    let Some(dir) = route.strip_suffix("/route") else {
        return false;
    };
    let last = dir.rsplit('/').next().unwrap_or(dir);
    let name = last.split('.').next().unwrap_or(last);
    METADATA_ROUTES.iter().any(|(metadata, _)| *metadata == name)
}

/// `/robots` -> `/robots.txt/route`, `/blog/icon` -> `/blog/icon/route`
pub fn normalize_metadata_route(page: &str) -> String {
    let (dir, last) = match page.rfind('/') {
        Some(i) => (&page[..i], &page[i + 1..]),
        None => ("", page),
    };

    match METADATA_ROUTES.iter().find(|(name, _)| *name == last) {
        Some((name, Some(ext))) => format!("{}/{}.{}/route", dir, name, ext),
        Some((name, None)) => format!("{}/{}/route", dir, name),
        None => page.to_string(),
    }
}

/// Options for [`create_pages_mapping`]
#[derive(Debug, Clone)]
pub struct PagesMappingOptions<'a> {
    pub dev: bool,
    pub page_extensions: &'a [String],
    pub page_paths: Vec<String>,
    pub collection: RouteCollection,
    pub has_pages_dir: bool,
}

/// Build the route map for one collection from its candidate files
pub fn create_pages_mapping(options: PagesMappingOptions<'_>) -> PagesMapping {
    let PagesMappingOptions {
        dev,
        page_extensions,
        mut page_paths,
        collection,
        has_pages_dir,
    } = options;

    page_paths.sort_by(sort_by_page_exts(page_extensions));

    let mut pages = PagesMapping::new();

    for page_path in &page_paths {
        if page_path.ends_with(".d.ts") && page_extensions.iter().any(|ext| ext == "ts") {
            continue;
        }

        let mut page_key = page_from_path(page_path, page_extensions);
        if collection == RouteCollection::App {
            page_key = page_key.replace("%5F", "_");
            if page_key == "/not-found" {
                page_key = NOT_FOUND_ROUTE.to_string();
            }
        }

        let alias_path = format!("{}{}", collection.alias(), ensure_leading_slash(page_path));

        let route = if collection == RouteCollection::App && is_metadata_route_file(page_path, page_extensions) {
            normalize_metadata_route(&page_key)
        } else {
            page_key
        };

        pages.insert(route, alias_path);
    }

    match collection {
        RouteCollection::Root => pages,
        RouteCollection::App => {
            let has_app_pages = pages.keys().any(|page| page.ends_with("/page"));
            if has_app_pages && !pages.contains_key(NOT_FOUND_ROUTE) {
                pages.insert(NOT_FOUND_ROUTE.to_string(), DEFAULT_NOT_FOUND_COMPONENT.to_string());
            }
            pages
        }
        RouteCollection::Pages => {
            let fallback_root = if dev && has_pages_dir {
                PAGES_DIR_ALIAS
            } else {
                INTERNAL_PAGES_DIR
            };

            for reserved in RESERVED_PAGES {
                let fallback = format!("{}{}", fallback_root, reserved);
                if dev {
                    pages.insert(reserved.to_string(), fallback);
                } else {
                    pages.entry(reserved.to_string()).or_insert(fallback);
                }
            }
            pages
        }
    }
}

/// Resolve an aliased source path back to a file-system path
pub fn page_file_path(alias_path: &str, dirs: &RouteDirs) -> PathBuf {
    let candidates = [
        (PAGES_DIR_ALIAS, dirs.pages_dir.as_deref()),
        (APP_DIR_ALIAS, dirs.app_dir.as_deref()),
        (ROOT_DIR_ALIAS, Some(dirs.root_dir.as_path())),
    ];

    for (alias, dir) in candidates {
        if let (Some(rest), Some(dir)) = (alias_path.strip_prefix(alias), dir) {
            return dir.join(rest.trim_start_matches('/'));
        }
    }

    PathBuf::from(alias_path)
}

/// What an aliased page path turns out to be on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    File(PathBuf),
    /// A framework default, e.g. `strata/dist/pages/_app`
    Internal(String),
}

/// Resolve an aliased page path.
///
/// Development maps reserved pages to an extensionless alias
/// (`private-next-pages/_app`). Those try each page extension and fall back
/// to the framework's default when the user has none.
pub fn resolve_page_alias(alias_path: &str, dirs: &RouteDirs, page_extensions: &[String]) -> PageSource {
    if alias_path.starts_with(INTERNAL_COMPONENTS_DIR) {
        return PageSource::Internal(alias_path.to_string());
    }

    let path = page_file_path(alias_path, dirs);
    let Some(reserved) = alias_path
        .strip_prefix(PAGES_DIR_ALIAS)
        .filter(|rest| RESERVED_PAGES.contains(rest))
    else {
        return PageSource::File(path);
    };

    page_extensions
        .iter()
        .map(|ext| {
            let mut file = path.clone().into_os_string();
            file.push(".");
            file.push(ext);
            PathBuf::from(file)
        })
        .find(|file| file.is_file())
        .map(PageSource::File)
        .unwrap_or_else(|| PageSource::Internal(format!("{}{}", INTERNAL_PAGES_DIR, reserved)))
}

/// `middleware` at the project root or under `src/`
pub fn is_middleware_file(page: &str) -> bool {
    page == "/middleware" || page == "/src/middleware"
}

/// The route a middleware file serves: always the root
///
/// `/middleware` and `/src/middleware` both become `/`.
pub fn middleware_route(page: &str) -> &str {
    let dir = page.strip_suffix("/middleware").unwrap_or(page);
    let dir = dir.strip_suffix("/src").unwrap_or(dir);
    if dir.is_empty() {
        "/"
    } else {
        dir
    }
}

/// `instrumentation` at the project root or under `src/`
pub fn is_instrumentation_hook_file(page: &str) -> bool {
    page == "/instrumentation" || page == "/src/instrumentation"
}

/// Route-handler pages in the app collection end in `/route`
pub fn is_app_route_route(page: &str) -> bool {
    page.ends_with("/route")
}

/// Page components in the app collection end in `/page`
pub fn is_app_page_route(page: &str) -> bool {
    page.ends_with("/page")
}

/// `/api` or anything under `/api/`
pub fn is_api_route(page: &str) -> bool {
    page == "/api" || page.starts_with("/api/")
}

/// The result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredRoutes {
    pub root: PagesMapping,
    pub pages: Option<PagesMapping>,
    pub app: Option<PagesMapping>,
}

impl DiscoveredRoutes {
    /// Flatten every collection into [`Route`] values
    pub fn routes(&self, dirs: &RouteDirs) -> Vec<Route> {
        let collections = [
            (RouteCollection::Root, Some(&self.root)),
            (RouteCollection::Pages, self.pages.as_ref()),
            (RouteCollection::App, self.app.as_ref()),
        ];

        collections
            .into_iter()
            .filter_map(|(collection, mapping)| mapping.map(|mapping| (collection, mapping)))
            .flat_map(|(collection, mapping)| {
                mapping.iter().map(move |(page, alias_path)| Route {
                    page: page.clone(),
                    collection,
                    alias_path: alias_path.clone(),
                    absolute_path: page_file_path(alias_path, dirs),
                    extension: split_extension(alias_path).1.trim_start_matches('.').to_string(),
                })
            })
            .collect()
    }

    /// Total number of routes across collections
    pub fn len(&self) -> usize {
        self.root.len()
            + self.pages.as_ref().map_or(0, |p| p.len())
            + self.app.as_ref().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walks the route directories of a project
#[derive(Debug, Clone)]
pub struct RouteDiscoverer {
    dirs: RouteDirs,
    page_extensions: Vec<String>,
    dev: bool,
}

impl RouteDiscoverer {
    pub fn new(dirs: RouteDirs, page_extensions: Vec<String>, dev: bool) -> Self {
        Self {
            dirs,
            page_extensions,
            dev,
        }
    }

    pub fn from_config(config: &Config, dev: bool) -> Self {
        Self::new(RouteDirs::from_config(config), config.page_extensions.clone(), dev)
    }

    pub fn dirs(&self) -> &RouteDirs {
        &self.dirs
    }

    pub fn page_extensions(&self) -> &[String] {
        &self.page_extensions
    }

    /// Discover every collection. Directory walks run on the blocking pool.
    pub async fn discover(&self) -> Result<DiscoveredRoutes> {
        let this = self.clone();
        let routes = tokio::task::spawn_blocking(move || this.discover_blocking()).await?;

        info!(
            "Discovered {} route(s) ({} pages, {} app)",
            routes.len(),
            routes.pages.as_ref().map_or(0, |p| p.len()),
            routes.app.as_ref().map_or(0, |p| p.len())
        );

        Ok(routes)
    }

    /// Synchronous discovery, used by [`discover`](Self::discover)
    pub fn discover_blocking(&self) -> DiscoveredRoutes {
        let pages = self.dirs.pages_dir.as_ref().map(|dir| {
            create_pages_mapping(PagesMappingOptions {
                dev: self.dev,
                page_extensions: &self.page_extensions,
                page_paths: collect_page_paths(dir, &self.page_extensions, RouteCollection::Pages),
                collection: RouteCollection::Pages,
                has_pages_dir: true,
            })
        });

        let app = self.dirs.app_dir.as_ref().map(|dir| {
            create_pages_mapping(PagesMappingOptions {
                dev: self.dev,
                page_extensions: &self.page_extensions,
                page_paths: collect_page_paths(dir, &self.page_extensions, RouteCollection::App),
                collection: RouteCollection::App,
                has_pages_dir: self.dirs.pages_dir.is_some(),
            })
        });

        let root = create_pages_mapping(PagesMappingOptions {
            dev: self.dev,
            page_extensions: &self.page_extensions,
            page_paths: self.root_page_paths(),
            collection: RouteCollection::Root,
            has_pages_dir: self.dirs.pages_dir.is_some(),
        });

        debug!("Root routes: {:?}", root.keys().collect::<Vec<_>>());

        DiscoveredRoutes { root, pages, app }
    }

    fn root_page_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();

        for prefix in ["", "src/"] {
            for name in ["middleware", "instrumentation"] {
                for ext in &self.page_extensions {
                    let relative = format!("{}{}.{}", prefix, name, ext);
                    if self.dirs.root_dir.join(&relative).is_file() {
                        paths.push(format!("/{}", relative));
                    }
                }
            }
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exts() -> Vec<String> {
        ["tsx", "ts", "jsx", "js"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_page_from_path() {
        let exts = exts();
        assert_eq!(page_from_path("/index.tsx", &exts), "/");
        assert_eq!(page_from_path("/blog/index.js", &exts), "/blog");
        assert_eq!(page_from_path("/blog/[slug].ts", &exts), "/blog/[slug]");
        assert_eq!(page_from_path("/about..jsx", &exts), "/about");
        assert_eq!(page_from_path("\\docs\\intro.tsx", &exts), "/docs/intro");
    }

    #[test]
    fn test_sort_by_page_exts_puts_preferred_last() {
        let exts = exts();
        let mut paths = vec![
            "/about.js".to_string(),
            "/about.tsx".to_string(),
            "/about.ts".to_string(),
        ];
        paths.sort_by(sort_by_page_exts(&exts));
        assert_eq!(paths, vec!["/about.tsx", "/about.ts", "/about.js"]);
    }

    #[test]
    fn test_later_extension_wins_collision() {
        let exts = exts();
        let mapping = create_pages_mapping(PagesMappingOptions {
            dev: false,
            page_extensions: &exts,
            page_paths: vec!["/about.js".into(), "/about.tsx".into()],
            collection: RouteCollection::Root,
            has_pages_dir: false,
        });
        assert_eq!(mapping["/about"], "private-next-root-dir/about.js");
    }

    #[test]
    fn test_app_mapping_restores_underscores_and_not_found() {
        let exts = exts();
        let mapping = create_pages_mapping(PagesMappingOptions {
            dev: false,
            page_extensions: &exts,
            page_paths: vec![
                "/%5Finternal/page.tsx".into(),
                "/not-found.tsx".into(),
                "/robots.ts".into(),
                "/types.d.ts".into(),
            ],
            collection: RouteCollection::App,
            has_pages_dir: false,
        });

        assert_eq!(mapping["/_internal/page"], "private-next-app-dir/%5Finternal/page.tsx");
        assert_eq!(mapping[NOT_FOUND_ROUTE], "private-next-app-dir/not-found.tsx");
        assert_eq!(mapping["/robots.txt/route"], "private-next-app-dir/robots.ts");
        assert!(!mapping.contains_key("/types.d"));
    }

    #[test]
    fn test_app_mapping_adds_default_not_found() {
        let exts = exts();
        let mapping = create_pages_mapping(PagesMappingOptions {
            dev: true,
            page_extensions: &exts,
            page_paths: vec!["/page.tsx".into()],
            collection: RouteCollection::App,
            has_pages_dir: false,
        });
        assert_eq!(mapping[NOT_FOUND_ROUTE], DEFAULT_NOT_FOUND_COMPONENT);
    }

    #[test]
    fn test_pages_reserved_routes() {
        let exts = exts();
        let prod = create_pages_mapping(PagesMappingOptions {
            dev: false,
            page_extensions: &exts,
            page_paths: vec!["/_app.tsx".into(), "/index.tsx".into()],
            collection: RouteCollection::Pages,
            has_pages_dir: true,
        });
        assert_eq!(prod["/_app"], "private-next-pages/_app.tsx");
        assert_eq!(prod["/_document"], "strata/dist/pages/_document");
        assert_eq!(prod["/_error"], "strata/dist/pages/_error");

        let dev = create_pages_mapping(PagesMappingOptions {
            dev: true,
            page_extensions: &exts,
            page_paths: vec!["/_app.tsx".into()],
            collection: RouteCollection::Pages,
            has_pages_dir: true,
        });
        assert_eq!(dev["/_app"], "private-next-pages/_app");
    }

    #[test]
    fn test_resolve_reserved_page_alias() {
        let dir = tempfile::TempDir::new().unwrap();
        let pages = dir.path().join("pages");
        std::fs::create_dir_all(&pages).unwrap();
        std::fs::write(pages.join("_app.tsx"), "export default function App() {}\n").unwrap();
        let dirs = RouteDirs {
            root_dir: dir.path().to_path_buf(),
            pages_dir: Some(pages.clone()),
            app_dir: None,
        };
        let exts = exts();

        assert_eq!(
            resolve_page_alias("private-next-pages/_app", &dirs, &exts),
            PageSource::File(pages.join("_app.tsx"))
        );
        assert_eq!(
            resolve_page_alias("private-next-pages/_document", &dirs, &exts),
            PageSource::Internal("strata/dist/pages/_document".into())
        );
        assert_eq!(
            resolve_page_alias("strata/dist/pages/_error", &dirs, &exts),
            PageSource::Internal("strata/dist/pages/_error".into())
        );
        assert_eq!(
            resolve_page_alias(DEFAULT_NOT_FOUND_COMPONENT, &dirs, &exts),
            PageSource::Internal(DEFAULT_NOT_FOUND_COMPONENT.into())
        );
        assert_eq!(
            resolve_page_alias("private-next-pages/about.tsx", &dirs, &exts),
            PageSource::File(pages.join("about.tsx"))
        );
    }

    #[test]
    fn test_page_file_path() {
        let dirs = RouteDirs {
            root_dir: PathBuf::from("/proj"),
            pages_dir: Some(PathBuf::from("/proj/pages")),
            app_dir: None,
        };
        assert_eq!(
            page_file_path("private-next-pages/blog.tsx", &dirs),
            PathBuf::from("/proj/pages/blog.tsx")
        );
        assert_eq!(
            page_file_path("private-next-root-dir/middleware.ts", &dirs),
            PathBuf::from("/proj/middleware.ts")
        );
        assert_eq!(
            page_file_path("private-next-app-dir/page.tsx", &dirs),
            PathBuf::from("private-next-app-dir/page.tsx")
        );
    }

    #[test]
    fn test_middleware_route() {
        assert_eq!(middleware_route("/middleware"), "/");
        assert_eq!(middleware_route("/src/middleware"), "/");
    }

    #[test]
    fn test_is_metadata_route() {
        assert!(is_metadata_route("/robots.txt/route"));
        assert!(is_metadata_route("app/blog/opengraph-image/route"));
        assert!(!is_metadata_route("app/api/users/route"));
        assert!(!is_metadata_route("app/icon/page"));
    }

    #[test]
    fn test_unreadable_directory_yields_nothing() {
        let paths = collect_page_paths(Path::new("/definitely/not/here"), &exts(), RouteCollection::Pages);
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_discover_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/blog/[slug]")).unwrap();
        fs::create_dir_all(root.join("app/_components")).unwrap();
        fs::create_dir_all(root.join("pages/api")).unwrap();
        fs::write(root.join("app/layout.tsx"), "").unwrap();
        fs::write(root.join("app/blog/[slug]/page.tsx"), "").unwrap();
        fs::write(root.join("app/_components/page.tsx"), "").unwrap();
        fs::write(root.join("pages/index.tsx"), "").unwrap();
        fs::write(root.join("pages/api/hello.ts"), "").unwrap();
        fs::write(root.join("middleware.ts"), "").unwrap();

        let discoverer = RouteDiscoverer::new(
            RouteDirs {
                root_dir: root.to_path_buf(),
                pages_dir: Some(root.join("pages")),
                app_dir: Some(root.join("app")),
            },
            exts(),
            false,
        );

        let first = discoverer.discover().await.unwrap();
        let second = discoverer.discover().await.unwrap();
        assert_eq!(first, second);

        let app = first.app.as_ref().unwrap();
        assert!(app.contains_key("/blog/[slug]/page"));
        assert!(!app.contains_key("/_components/page"));
        assert!(!app.contains_key("/layout"));
        assert!(first.pages.as_ref().unwrap().contains_key("/api/hello"));
        assert_eq!(first.root["/middleware"], "private-next-root-dir/middleware.ts");

        let routes = first.routes(discoverer.dirs());
        let middleware = routes.iter().find(|r| r.page == "/middleware").unwrap();
        assert_eq!(middleware.collection, RouteCollection::Root);
        assert_eq!(middleware.extension, "ts");
        assert_eq!(middleware.absolute_path, root.join("middleware.ts"));
    }
}
