//! Browser entries for client components
//!
//! The server compilers discover which client components each app segment
//! references. Every segment with client components gets a browser entry
//! loading exactly those modules; the page or route segment always gets one.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;

use tracing::debug;

use crate::bundler::{Compilation, ModuleId};
use crate::entries::{
    ClientModuleRequest, EntryDescriptor, EntryImport, FlightClientEntryLoaderOptions, Layer, LoaderOptions,
};
use crate::routes::RouteCollection;
use crate::utils::normalize_path_sep;

#[derive(Debug, Default)]
struct PendingEntry {
    page: String,
    /// Client module request -> referenced exports
    modules: BTreeMap<String, BTreeSet<String>>,
}

/// Client modules reachable from a segment without crossing a client boundary
fn collect_client_modules(compilation: &Compilation, segment: ModuleId) -> BTreeMap<String, BTreeSet<String>> {
    let graph = &compilation.graph;
    let mut found = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([segment]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(module) = graph.module(id) else { continue };
        if module.layer != Some(Layer::ReactServerComponents) {
            continue;
        }

        if compilation.build_info.is_client_module(&module.identifier) {
            let ids: BTreeSet<String> = match &module.used_exports {
                Some(used) if !used.is_empty() => used.iter().cloned().collect(),
                _ => BTreeSet::from(["*".to_string()]),
            };
            let request = module
                .resource
                .as_deref()
                .map(|path| normalize_path_sep(&path.to_string_lossy()))
                .unwrap_or_else(|| module.request.clone());
            found.entry(request).or_insert_with(BTreeSet::new).extend(ids);
            continue;
        }

        queue.extend(graph.connections(id).iter().map(|connection| connection.module));
    }

    found
}

/// `app/blog/layout` for `<app_dir>/blog/layout.tsx`
fn segment_entry_name(resource: &Path, app_dir: &Path) -> Option<String> {
    let relative = resource.strip_prefix(app_dir).ok()?.with_extension("");
    Some(format!("app/{}", normalize_path_sep(&relative.to_string_lossy())))
}

fn is_app_entry(options: &LoaderOptions) -> bool {
    match options {
        LoaderOptions::App(_) | LoaderOptions::EdgeAppRoute(_) => true,
        LoaderOptions::EdgeSsr(ssr) => ssr.app_loader.is_some(),
        _ => false,
    }
}

/// Browser entries for the app routes of the given server compilations,
/// keyed by entry name
pub fn flight_client_entries<'a>(
    compilations: impl IntoIterator<Item = &'a Compilation>,
    app_dir: &Path,
) -> BTreeMap<String, EntryDescriptor> {
    let mut pending: BTreeMap<String, PendingEntry> = BTreeMap::new();

    for compilation in compilations {
        for (name, entry) in &compilation.entries {
            if !entry.descriptor.loader().map_or(false, is_app_entry) {
                continue;
            }

            for &loader in &entry.modules {
                let segments = compilation.graph.connections(loader);
                for (index, connection) in segments.iter().enumerate() {
                    let is_route_segment = index + 1 == segments.len();
                    let modules = collect_client_modules(compilation, connection.module);
                    if modules.is_empty() && !is_route_segment {
                        continue;
                    }

                    let entry_name = if is_route_segment {
                        name.clone()
                    } else {
                        let resource = compilation
                            .graph
                            .module(connection.module)
                            .and_then(|module| module.resource.as_deref());
                        match resource.and_then(|resource| segment_entry_name(resource, app_dir)) {
                            Some(entry_name) => entry_name,
                            None => continue,
                        }
                    };

                    let pending_entry = pending.entry(entry_name).or_insert_with(|| PendingEntry {
                        page: entry.descriptor.page.clone(),
                        ..PendingEntry::default()
                    });
                    for (request, ids) in modules {
                        pending_entry.modules.entry(request).or_default().extend(ids);
                    }
                }
            }
        }
    }

    pending
        .into_iter()
        .map(|(name, pending_entry)| {
            let modules = pending_entry
                .modules
                .into_iter()
                .map(|(request, ids)| ClientModuleRequest {
                    request,
                    ids: if ids.contains("*") {
                        vec!["*".to_string()]
                    } else {
                        ids.into_iter().collect()
                    },
                })
                .collect::<Vec<_>>();
            debug!("Client entry {} ({} modules)", name, modules.len());

            let options = FlightClientEntryLoaderOptions {
                page: name.clone(),
                modules,
                server: false,
            };
            let descriptor = EntryDescriptor::new(
                &name,
                pending_entry.page,
                RouteCollection::App,
                vec![EntryImport::Loader(LoaderOptions::FlightClientEntry(options))],
            )
            .with_layer(Some(Layer::AppPagesBrowser));
            (name, descriptor)
        })
        .collect()
}
