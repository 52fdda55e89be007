//! Build manifests
//!
//! Client reference manifests for app routes, the edge middleware manifest
//! and the browser entries injected for client components.

mod client_entries;
mod client_reference;
mod middleware;
mod sorted_routes;

pub use client_entries::flight_client_entries;
pub use client_reference::{
    client_reference_manifests, entry_name_to_group_name, manifest_asset, required_chunks, ClientReferenceManifest,
    ClientReferenceManifestPlugin, ClientReferenceState, ManifestNode, ModuleInfo, ModuleLoading,
    CLIENT_REFERENCE_MANIFEST,
};
pub use middleware::{
    check_dynamic_code, check_unsupported_apis, extract_metadata, interception_rewrites, is_interception_route, middleware_manifest,
    named_middleware_regex, EdgeFunctionDefinition, EntryMetadata, InterceptionRewrite, MiddlewareManifest,
    MiddlewarePlugin, INTERCEPTION_ROUTE_REWRITE_MANIFEST, MIDDLEWARE_MANIFEST,
};
pub use sorted_routes::sorted_routes;
