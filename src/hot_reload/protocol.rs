//! Hot update wire protocol
//!
//! Server messages are tagged by `action`, client telemetry by `event`.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// WebSocket endpoint served by the dev server
pub const HMR_ENDPOINT: &str = "/_strata/webpack-hmr";

/// A compilation error or warning as sent to the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl CompilationMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
        }
    }
}

impl From<&BuildError> for CompilationMessage {
    fn from(error: &BuildError) -> Self {
        let module_name = match error {
            BuildError::ConfigConflict { page, .. } | BuildError::UnsupportedValue { page, .. } => Some(page.clone()),
            BuildError::UnsafeRuntimeConstruct { module, .. } => Some(module.clone()),
            BuildError::ModuleNotFound { importer, .. } => Some(importer.clone()),
            _ => None,
        };
        Self {
            message: error.to_string(),
            module_name,
        }
    }
}

/// Staleness of the running framework version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub installed: String,
    pub staleness: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            installed: env!("CARGO_PKG_VERSION").to_string(),
            staleness: "unknown".to_string(),
        }
    }
}

/// Messages pushed from the dev server to connected clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ServerMessage {
    Building,
    Built {
        hash: String,
        #[serde(default)]
        errors: Vec<CompilationMessage>,
        #[serde(default)]
        warnings: Vec<CompilationMessage>,
    },
    /// State snapshot for a freshly connected client
    #[serde(rename_all = "camelCase")]
    Sync {
        hash: String,
        #[serde(default)]
        errors: Vec<CompilationMessage>,
        #[serde(default)]
        warnings: Vec<CompilationMessage>,
        version_info: VersionInfo,
    },
    ServerComponentChanges,
    ReloadPage,
    AddedPage {
        data: Vec<String>,
    },
    RemovedPage {
        data: Vec<String>,
    },
    ServerError {
        #[serde(rename = "errorJSON")]
        error_json: String,
    },
}

impl ServerMessage {
    pub fn built<'a>(
        hash: impl Into<String>,
        errors: impl IntoIterator<Item = &'a BuildError>,
        warnings: impl IntoIterator<Item = &'a BuildError>,
    ) -> Self {
        ServerMessage::Built {
            hash: hash.into(),
            errors: errors.into_iter().map(CompilationMessage::from).collect(),
            warnings: warnings.into_iter().map(CompilationMessage::from).collect(),
        }
    }

    /// `serverError` carrying `{message, stack}` as embedded JSON
    pub fn server_error(message: &str, stack: Option<&str>) -> Self {
        let payload = serde_json::json!({ "message": message, "stack": stack });
        ServerMessage::ServerError {
            error_json: payload.to_string(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ServerMessage::Building => "building",
            ServerMessage::Built { .. } => "built",
            ServerMessage::Sync { .. } => "sync",
            ServerMessage::ServerComponentChanges => "serverComponentChanges",
            ServerMessage::ReloadPage => "reloadPage",
            ServerMessage::AddedPage { .. } => "addedPage",
            ServerMessage::RemovedPage { .. } => "removedPage",
            ServerMessage::ServerError { .. } => "serverError",
        }
    }
}

/// Payload of a `serverError` message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerErrorPayload {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Fire-and-forget telemetry sent from a client to the dev server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    ClientSuccess { client_id: u64 },
    #[serde(rename_all = "camelCase")]
    ClientError { error_count: usize, client_id: u64 },
    #[serde(rename_all = "camelCase")]
    ClientWarning { warning_count: usize, client_id: u64 },
    #[serde(rename_all = "camelCase")]
    ClientFullReload {
        #[serde(default)]
        stack_trace: Option<String>,
        had_runtime_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dependency_chain: Option<Vec<String>>,
    },
    #[serde(rename_all = "camelCase")]
    ClientHmrLatency {
        id: u64,
        start_time: u64,
        end_time: u64,
        page: String,
        updated_modules: Vec<String>,
        is_page_hidden: bool,
    },
    #[serde(rename_all = "camelCase")]
    ClientReloadPage { client_id: u64 },
    #[serde(rename_all = "camelCase")]
    ServerComponentReloadPage { client_id: u64 },
}
