//! Module graph layers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition of the module graph. Modules in different layers never share
/// a bundle, which keeps server-only code out of browser output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    #[serde(rename = "shared")]
    Shared,
    #[serde(rename = "rsc")]
    ReactServerComponents,
    #[serde(rename = "ssr")]
    ServerSideRendering,
    #[serde(rename = "action-browser")]
    ActionBrowser,
    #[serde(rename = "api")]
    Api,
    #[serde(rename = "middleware")]
    Middleware,
    #[serde(rename = "instrument")]
    Instrument,
    #[serde(rename = "edge-asset")]
    EdgeAsset,
    #[serde(rename = "app-pages-browser")]
    AppPagesBrowser,
    #[serde(rename = "app-metadata-route")]
    AppMetadataRoute,
    #[serde(rename = "app-route-handler")]
    AppRouteHandler,
}

impl Layer {
    pub const ALL: [Layer; 11] = [
        Layer::Shared,
        Layer::ReactServerComponents,
        Layer::ServerSideRendering,
        Layer::ActionBrowser,
        Layer::Api,
        Layer::Middleware,
        Layer::Instrument,
        Layer::EdgeAsset,
        Layer::AppPagesBrowser,
        Layer::AppMetadataRoute,
        Layer::AppRouteHandler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Shared => "shared",
            Layer::ReactServerComponents => "rsc",
            Layer::ServerSideRendering => "ssr",
            Layer::ActionBrowser => "action-browser",
            Layer::Api => "api",
            Layer::Middleware => "middleware",
            Layer::Instrument => "instrument",
            Layer::EdgeAsset => "edge-asset",
            Layer::AppPagesBrowser => "app-pages-browser",
            Layer::AppMetadataRoute => "app-metadata-route",
            Layer::AppRouteHandler => "app-route-handler",
        }
    }

    /// Layers whose modules get the edge safety analysis
    pub fn is_edge_sandboxed(&self) -> bool {
        matches!(self, Layer::Middleware | Layer::Api)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
