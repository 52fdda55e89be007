//! Hot update channel
//!
//! The dev server pushes [`ServerMessage`]s over a WebSocket. A
//! [`HotReloadClient`] reduces them into overlay state and applies patches
//! to a [`HotRuntime`], answering with [`ClientEvent`] telemetry.

mod client;
mod protocol;
mod reducer;
mod ws;

pub use client::{
    HostEnvironment, HotReloadClient, HotRuntime, HotUpdateError, PendingHotUpdate, RuntimeStatus, UpdateGate,
};
pub use protocol::{
    ClientEvent, CompilationMessage, ServerErrorPayload, ServerMessage, VersionInfo, HMR_ENDPOINT,
};
pub use reducer::{reduce, BuildStatus, OverlayAction, OverlayState, RefreshState};
pub use ws::{connect, hmr_url, HeadlessClient, HeadlessHost, HeadlessRuntime};
