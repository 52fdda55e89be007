//! Per-compiler entry post-processing

use super::{EntryDescriptor, EntryImport, EntryLibrary, Layer, Target};
use crate::routes::RouteCollection;

pub const CLIENT_RUNTIME_MAIN: &str = "main";
pub const CLIENT_RUNTIME_MAIN_APP: &str = "main-app";
pub const CLIENT_RUNTIME_POLYFILLS: &str = "polyfills";
pub const CLIENT_RUNTIME_REACT_REFRESH: &str = "react-refresh";
pub const APP_CLIENT_INTERNALS: &str = "app-pages-internals";

pub const SERVER_RUNTIME: &str = "strata-runtime";
pub const SERVER_API_RUNTIME: &str = "strata-api-runtime";
pub const EDGE_RUNTIME: &str = "strata-edge-runtime";

const CLIENT_RUNTIME_BUNDLES: [&str; 4] = [
    CLIENT_RUNTIME_POLYFILLS,
    CLIENT_RUNTIME_MAIN,
    CLIENT_RUNTIME_MAIN_APP,
    CLIENT_RUNTIME_REACT_REFRESH,
];

fn is_instrumentation_filename(name: &str) -> bool {
    name == "instrumentation" || name == "src/instrumentation"
}

fn is_middleware_filename(name: &str) -> bool {
    name == "middleware" || name == "src/middleware"
}

/// Apply compiler-specific settings. Anything the entry already sets wins.
pub fn finalize_entrypoint(target: Target, mut entry: EntryDescriptor, has_app_dir: bool) -> EntryDescriptor {
    let name = entry.name.as_str();
    let is_api = name.starts_with("pages/api/");
    let is_instrumentation = is_instrumentation_filename(name);

    match target {
        Target::Server => {
            let layer = if is_api {
                Some(Layer::Api)
            } else if is_instrumentation {
                Some(Layer::Instrument)
            } else if entry.is_server_component {
                Some(Layer::ReactServerComponents)
            } else {
                None
            };

            if is_api {
                entry.public_path.get_or_insert_with(String::new);
            }
            let runtime = if is_api { SERVER_API_RUNTIME } else { SERVER_RUNTIME };
            entry.runtime.get_or_insert_with(|| runtime.to_string());
            entry.layer = entry.layer.or(layer);
        }
        Target::EdgeServer => {
            let layer = if is_api {
                Some(Layer::Api)
            } else if is_middleware_filename(name) || is_instrumentation {
                Some(Layer::Middleware)
            } else {
                None
            };

            entry.layer = entry.layer.or(layer);
            entry.library.get_or_insert_with(|| EntryLibrary {
                name: vec!["_ENTRIES".to_string(), "middleware_[name]".to_string()],
                kind: "assign".to_string(),
            });
            entry.runtime.get_or_insert_with(|| EDGE_RUNTIME.to_string());
            entry.async_chunks.get_or_insert(false);
        }
        Target::Client => {
            let is_app_layer = has_app_dir
                && (name == CLIENT_RUNTIME_MAIN_APP || name == APP_CLIENT_INTERNALS || name.starts_with("app/"));

            if !CLIENT_RUNTIME_BUNDLES.contains(&name) {
                let depend_on = if is_app_layer {
                    CLIENT_RUNTIME_MAIN_APP
                } else if name.starts_with("pages/") && name != "pages/_app" {
                    "pages/_app"
                } else {
                    CLIENT_RUNTIME_MAIN
                };
                entry.depend_on.get_or_insert_with(|| depend_on.to_string());
            }
            if is_app_layer {
                entry.layer = entry.layer.or(Some(Layer::AppPagesBrowser));
            }
        }
    }

    entry
}

/// The client runtime bundles every build carries
pub fn runtime_entries(has_app_dir: bool, dev: bool) -> Vec<EntryDescriptor> {
    let mut entries = vec![
        (CLIENT_RUNTIME_MAIN, "strata/dist/client/index"),
        (CLIENT_RUNTIME_POLYFILLS, "strata/dist/client/polyfills"),
    ];
    if dev {
        entries.push((CLIENT_RUNTIME_REACT_REFRESH, "strata/dist/client/react-refresh"));
    }
    if has_app_dir {
        entries.push((CLIENT_RUNTIME_MAIN_APP, "strata/dist/client/app-index"));
        entries.push((APP_CLIENT_INTERNALS, "strata/dist/client/components/app-router"));
    }

    entries
        .into_iter()
        .map(|(name, module)| {
            let collection = if name == CLIENT_RUNTIME_MAIN_APP || name == APP_CLIENT_INTERNALS {
                RouteCollection::App
            } else {
                RouteCollection::Pages
            };
            EntryDescriptor::new(name, name, collection, vec![EntryImport::Module(module.to_string())])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str) -> EntryDescriptor {
        EntryDescriptor::new(name, "/x", RouteCollection::Pages, vec![EntryImport::Module("m".to_string())])
    }

    #[test]
    fn test_server_api_entry() {
        let finalized = finalize_entrypoint(Target::Server, entry("pages/api/hello"), false);
        assert_eq!(finalized.public_path.as_deref(), Some(""));
        assert_eq!(finalized.runtime.as_deref(), Some(SERVER_API_RUNTIME));
        assert_eq!(finalized.layer, Some(Layer::Api));
    }

    #[test]
    fn test_server_component_and_explicit_layer() {
        let mut rsc = entry("app/page");
        rsc.is_server_component = true;
        assert_eq!(finalize_entrypoint(Target::Server, rsc, true).layer, Some(Layer::ReactServerComponents));

        let instrumentation = entry("instrumentation").with_layer(Some(Layer::Instrument));
        let finalized = finalize_entrypoint(Target::Server, instrumentation, false);
        assert_eq!(finalized.layer, Some(Layer::Instrument));
        assert_eq!(finalized.runtime.as_deref(), Some(SERVER_RUNTIME));
    }

    #[test]
    fn test_edge_entries() {
        let finalized = finalize_entrypoint(Target::EdgeServer, entry("middleware"), false);
        assert_eq!(finalized.layer, Some(Layer::Middleware));
        assert_eq!(finalized.runtime.as_deref(), Some(EDGE_RUNTIME));
        assert_eq!(finalized.async_chunks, Some(false));
        assert_eq!(
            finalized.library.unwrap().name,
            vec!["_ENTRIES".to_string(), "middleware_[name]".to_string()]
        );

        let page = finalize_entrypoint(Target::EdgeServer, entry("pages/blog"), false);
        assert_eq!(page.layer, None);
    }

    #[test]
    fn test_client_depend_on() {
        let page = finalize_entrypoint(Target::Client, entry("pages/blog"), false);
        assert_eq!(page.depend_on.as_deref(), Some("pages/_app"));

        let app = finalize_entrypoint(Target::Client, entry("pages/_app"), false);
        assert_eq!(app.depend_on.as_deref(), Some(CLIENT_RUNTIME_MAIN));

        let app_page = finalize_entrypoint(Target::Client, entry("app/blog/page"), true);
        assert_eq!(app_page.depend_on.as_deref(), Some(CLIENT_RUNTIME_MAIN_APP));
        assert_eq!(app_page.layer, Some(Layer::AppPagesBrowser));
    }

    #[test]
    fn test_runtime_bundles_pass_through() {
        for runtime in runtime_entries(false, true) {
            let finalized = finalize_entrypoint(Target::Client, runtime.clone(), false);
            assert_eq!(finalized, runtime);
        }

        let main_app = runtime_entries(true, false)
            .into_iter()
            .find(|e| e.name == CLIENT_RUNTIME_MAIN_APP)
            .unwrap();
        let finalized = finalize_entrypoint(Target::Client, main_app, true);
        assert_eq!(finalized.depend_on, None);
        assert_eq!(finalized.layer, Some(Layer::AppPagesBrowser));
    }
}
