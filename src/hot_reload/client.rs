//! Client side of the hot update channel
//!
//! [`HotReloadClient`] reduces server messages one at a time. It decides
//! between a hot patch, a soft refresh and a full reload, reports telemetry
//! back to the server and gates callers waiting for the next patch.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::protocol::{ClientEvent, CompilationMessage, ServerErrorPayload, ServerMessage};
use super::reducer::{reduce, OverlayAction, OverlayState};

const MAX_LOGGED_WARNINGS: usize = 5;

/// Lines of a failed patch's stack trace reported with a full reload
const FULL_RELOAD_STACK_LINES: usize = 5;

/// Hot module state of the running code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Idle,
    Check,
    Prepare,
    Apply,
    Abort,
    Fail,
}

/// A patch that could not be applied
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HotUpdateError {
    pub message: String,
    pub stack: Option<String>,
    /// Modules between the changed one and the one that refused the update
    pub dependency_chain: Option<Vec<String>>,
}

impl HotUpdateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            dependency_chain: None,
        }
    }
}

/// The module runtime patches are applied to
#[async_trait]
pub trait HotRuntime: Send + Sync {
    /// Hash of the code currently running
    fn current_hash(&self) -> String;

    fn status(&self) -> RuntimeStatus;

    /// Look for a patch moving the runtime to `hash`. `None` when no patch
    /// applies; otherwise the modules it would replace.
    async fn check(&self, hash: &str) -> Result<Option<Vec<String>>, HotUpdateError>;

    /// Apply the patch found by the last `check`, returning the replaced
    /// modules
    async fn apply(&self) -> Result<Vec<String>, HotUpdateError>;
}

/// Where the client runs: the outgoing socket, page reloads and the router
pub trait HostEnvironment: Send + Sync {
    fn send(&self, event: ClientEvent);

    /// Hard reload of the whole page
    fn reload(&self);

    /// Re-fetch server-rendered content without touching client modules
    fn soft_refresh(&self);

    fn pathname(&self) -> String;

    fn is_hidden(&self) -> bool {
        false
    }

    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// State of the pending-update gate for one build cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateGate {
    Pending { cycle: u64 },
    Resolved { cycle: u64 },
}

impl UpdateGate {
    fn cycle(&self) -> u64 {
        match *self {
            UpdateGate::Pending { cycle } | UpdateGate::Resolved { cycle } => cycle,
        }
    }
}

/// Completes once the current build cycle's patch has been applied
#[derive(Debug)]
pub struct PendingHotUpdate(watch::Receiver<UpdateGate>);

impl PendingHotUpdate {
    pub async fn wait(mut self) {
        let _ = self
            .0
            .wait_for(|gate| matches!(gate, UpdateGate::Resolved { .. }))
            .await;
    }
}

pub struct HotReloadClient<R, H> {
    runtime: R,
    host: H,
    client_id: u64,
    overlay: OverlayState,
    most_recent_hash: Option<String>,
    had_runtime_error: bool,
    reloading: bool,
    start_latency: Option<u64>,
    gate: watch::Sender<UpdateGate>,
    resolved_cycles: u64,
}

impl<R: HotRuntime, H: HostEnvironment> HotReloadClient<R, H> {
    pub fn new(runtime: R, host: H) -> Self {
        let client_id = host.now_ms();
        let (gate, _) = watch::channel(UpdateGate::Resolved { cycle: 0 });
        Self {
            runtime,
            host,
            client_id,
            overlay: OverlayState::default(),
            most_recent_hash: None,
            had_runtime_error: false,
            reloading: false,
            start_latency: None,
            gate,
            resolved_cycles: 0,
        }
    }

    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Latest build hash announced by the server
    pub fn most_recent_hash(&self) -> Option<&str> {
        self.most_recent_hash.as_deref()
    }

    pub fn gate(&self) -> UpdateGate {
        *self.gate.borrow()
    }

    /// Number of build cycles whose gate has been resolved
    pub fn resolved_cycles(&self) -> u64 {
        self.resolved_cycles
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    pub fn pending_hot_update(&self) -> PendingHotUpdate {
        PendingHotUpdate(self.gate.subscribe())
    }

    /// Flag an error the running code cannot recover from; the next update
    /// becomes a full reload
    pub fn on_unrecoverable_error(&mut self) {
        self.had_runtime_error = true;
    }

    /// Close the error overlay
    pub fn dismiss(&mut self) {
        self.dispatch(OverlayAction::Dismiss);
    }

    /// Parse and process one raw socket message. Messages without an
    /// `action` or with an unknown one are ignored.
    pub async fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!("[HMR] Invalid message: {} ({})", text, err);
                return None;
            }
        };
        if value.get("action").is_none() {
            return None;
        }
        match serde_json::from_value::<ServerMessage>(value) {
            Ok(message) => {
                self.process(message.clone()).await;
                Some(message)
            }
            Err(err) => {
                debug!("Ignoring HMR message {}: {}", text, err);
                None
            }
        }
    }

    pub async fn process(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Building => {
                self.start_latency = Some(self.host.now_ms());
                self.arm_gate();
                self.dispatch(OverlayAction::Building);
                info!("[Fast Refresh] rebuilding");
            }
            ServerMessage::Built { hash, errors, warnings } => {
                self.most_recent_hash = Some(hash);
                if self.report_compilation(&errors, &warnings) {
                    self.handle_hot_update().await;
                }
            }
            ServerMessage::Sync {
                hash,
                errors,
                warnings,
                version_info,
            } => {
                self.most_recent_hash = Some(hash);
                self.dispatch(OverlayAction::VersionInfo(version_info));
                if self.report_compilation(&errors, &warnings) {
                    self.dispatch(OverlayAction::BuildOk);
                }
            }
            ServerMessage::ServerComponentChanges => {
                self.host.send(ClientEvent::ServerComponentReloadPage {
                    client_id: self.client_id,
                });
                if self.had_runtime_error {
                    self.reload();
                    return;
                }
                self.host.soft_refresh();
                self.dispatch(OverlayAction::Refresh);
            }
            ServerMessage::ReloadPage => {
                self.host.send(ClientEvent::ClientReloadPage {
                    client_id: self.client_id,
                });
                self.reload();
            }
            ServerMessage::AddedPage { data } | ServerMessage::RemovedPage { data } => {
                debug!("Route set changed: {:?}", data);
                self.host.soft_refresh();
            }
            ServerMessage::ServerError { error_json } => match serde_json::from_str::<ServerErrorPayload>(&error_json) {
                Ok(payload) => {
                    let message = match payload.stack {
                        Some(stack) if !stack.is_empty() => format!("{}\n{}", payload.message, stack),
                        _ => payload.message,
                    };
                    self.handle_errors(&[CompilationMessage::new(message)]);
                }
                Err(err) => warn!("[HMR] Invalid server error payload: {}", err),
            },
        }
    }

    fn dispatch(&mut self, action: OverlayAction) {
        self.overlay = reduce(&self.overlay, action);
    }

    fn arm_gate(&mut self) {
        let cycle = self.gate.borrow().cycle() + 1;
        self.gate.send_replace(UpdateGate::Pending { cycle });
    }

    fn resolve_gate(&mut self) {
        let resolved = self.gate.send_if_modified(|gate| match *gate {
            UpdateGate::Pending { cycle } => {
                *gate = UpdateGate::Resolved { cycle };
                true
            }
            UpdateGate::Resolved { .. } => false,
        });
        if resolved {
            self.resolved_cycles += 1;
        }
    }

    /// Send the outcome of a compilation and surface errors. Returns whether
    /// the compilation succeeded.
    fn report_compilation(&mut self, errors: &[CompilationMessage], warnings: &[CompilationMessage]) -> bool {
        if !errors.is_empty() {
            self.host.send(ClientEvent::ClientError {
                error_count: errors.len(),
                client_id: self.client_id,
            });
            self.handle_errors(errors);
            return false;
        }

        if !warnings.is_empty() {
            self.host.send(ClientEvent::ClientWarning {
                warning_count: warnings.len(),
                client_id: self.client_id,
            });
            for (index, warning) in warnings.iter().enumerate() {
                if index == MAX_LOGGED_WARNINGS {
                    warn!("There were more warnings in other files.\nYou can find a complete log in the terminal.");
                    break;
                }
                warn!("{}", warning.message);
            }
        }

        self.host.send(ClientEvent::ClientSuccess {
            client_id: self.client_id,
        });
        true
    }

    /// Show the first error and log all of them. Reloading waits for the
    /// next successful build.
    fn handle_errors(&mut self, errors: &[CompilationMessage]) {
        if let Some(first) = errors.first() {
            self.dispatch(OverlayAction::BuildError(first.message.clone()));
        }
        for err in errors {
            error!("{}", err.message);
        }
    }

    fn is_update_available(&self) -> bool {
        match &self.most_recent_hash {
            Some(hash) => *hash != self.runtime.current_hash(),
            None => false,
        }
    }

    async fn handle_hot_update(&mut self) {
        if self.had_runtime_error {
            warn!("[Fast Refresh] performing full reload because your application had an unrecoverable error");
            self.perform_full_reload(None);
            return;
        }

        if !self.is_update_available() {
            self.resolve_gate();
            self.dispatch(OverlayAction::BuildOk);
            self.report_latency(Vec::new());
            return;
        }

        let status = self.runtime.status();
        if status != RuntimeStatus::Idle {
            warn!("[Fast Refresh] performing full reload, the module runtime is in state {:?}", status);
            self.perform_full_reload(None);
            return;
        }

        let mut announce = true;
        loop {
            let hash = self.most_recent_hash.clone().unwrap_or_default();
            let before = self.runtime.current_hash();

            let updated = match self.runtime.check(&hash).await {
                Ok(Some(updated)) => updated,
                Ok(None) => {
                    warn!("[Fast Refresh] performing full reload, no update applies to {}", hash);
                    self.perform_full_reload(None);
                    return;
                }
                Err(err) => {
                    self.full_reload_after_failed_patch(&err);
                    return;
                }
            };
            if announce && !updated.is_empty() {
                self.dispatch(OverlayAction::BeforeRefresh);
            }

            let applied = match self.runtime.apply().await {
                Ok(applied) => applied,
                Err(err) => {
                    self.full_reload_after_failed_patch(&err);
                    return;
                }
            };

            if announce {
                self.resolve_gate();
                self.dispatch(OverlayAction::BuildOk);
                self.report_latency(applied.clone());
                if !applied.is_empty() {
                    self.dispatch(OverlayAction::Refresh);
                }
            } else {
                self.dispatch(OverlayAction::BuildOk);
            }
            announce = announce && applied.is_empty();

            // A newer build may have been announced while this patch applied
            if !self.is_update_available() || self.runtime.current_hash() == before {
                self.dispatch(OverlayAction::BuildOk);
                return;
            }
        }
    }

    fn full_reload_after_failed_patch(&mut self, err: &HotUpdateError) {
        warn!(
            "[Fast Refresh] performing full reload\n\nFast Refresh will perform a full reload when you edit a file that's imported by modules outside of the component tree. ({})",
            err
        );
        self.perform_full_reload(Some(err));
    }

    fn perform_full_reload(&mut self, err: Option<&HotUpdateError>) {
        let stack_trace = err.map(|err| match &err.stack {
            Some(stack) if !stack.is_empty() => stack
                .lines()
                .take(FULL_RELOAD_STACK_LINES)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => err.message.clone(),
        });
        self.host.send(ClientEvent::ClientFullReload {
            stack_trace,
            had_runtime_error: self.had_runtime_error,
            dependency_chain: err.and_then(|err| err.dependency_chain.clone()),
        });
        self.reload();
    }

    fn reload(&mut self) {
        if self.reloading {
            return;
        }
        self.reloading = true;
        self.host.reload();
    }

    fn report_latency(&mut self, updated_modules: Vec<String>) {
        let Some(start_time) = self.start_latency else {
            return;
        };
        let end_time = self.host.now_ms();
        info!("[Fast Refresh] done in {}ms", end_time.saturating_sub(start_time));
        self.host.send(ClientEvent::ClientHmrLatency {
            id: self.client_id,
            start_time,
            end_time,
            page: self.host.pathname(),
            updated_modules,
            is_page_hidden: self.host.is_hidden(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hot_reload::reducer::{BuildStatus, RefreshState};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct FakeRuntime {
        hash: Mutex<String>,
        target: Mutex<Option<String>>,
        status: Mutex<RuntimeStatus>,
        /// `None` makes every check report that no patch applies
        updates: Option<Vec<String>>,
        fail_apply: bool,
        checks: AtomicU64,
    }

    impl FakeRuntime {
        fn new(updates: Option<&[&str]>) -> Self {
            Self {
                hash: Mutex::new("initial".into()),
                target: Mutex::new(None),
                status: Mutex::new(RuntimeStatus::Idle),
                updates: updates.map(|modules| modules.iter().map(|m| m.to_string()).collect()),
                fail_apply: false,
                checks: AtomicU64::new(0),
            }
        }

        fn checks(&self) -> u64 {
            self.checks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HotRuntime for FakeRuntime {
        fn current_hash(&self) -> String {
            self.hash.lock().clone()
        }

        fn status(&self) -> RuntimeStatus {
            *self.status.lock()
        }

        async fn check(&self, hash: &str) -> Result<Option<Vec<String>>, HotUpdateError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            *self.target.lock() = Some(hash.to_string());
            Ok(self.updates.clone())
        }

        async fn apply(&self) -> Result<Vec<String>, HotUpdateError> {
            if self.fail_apply {
                *self.status.lock() = RuntimeStatus::Fail;
                return Err(HotUpdateError {
                    message: "Aborted because ./app/util.ts is not accepted".into(),
                    stack: Some((1..=8).map(|i| format!("at frame{}", i)).collect::<Vec<_>>().join("\n")),
                    dependency_chain: Some(vec!["./app/util.ts".into(), "./app/page.tsx".into()]),
                });
            }
            if let Some(target) = self.target.lock().take() {
                *self.hash.lock() = target;
            }
            Ok(self.updates.clone().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        events: Mutex<Vec<ClientEvent>>,
        reloads: AtomicU64,
        refreshes: AtomicU64,
        clock: AtomicU64,
    }

    impl RecordingHost {
        fn events(&self) -> Vec<ClientEvent> {
            self.events.lock().clone()
        }

        fn count(&self, event: &str) -> usize {
            self.events()
                .iter()
                .filter(|e| serde_json::to_value(e).unwrap()["event"] == event)
                .count()
        }
    }

    impl HostEnvironment for RecordingHost {
        fn send(&self, event: ClientEvent) {
            self.events.lock().push(event);
        }

        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }

        fn soft_refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        fn pathname(&self) -> String {
            "/blog".into()
        }

        fn now_ms(&self) -> u64 {
            self.clock.fetch_add(10, Ordering::SeqCst) + 1000
        }
    }

    fn built(hash: &str) -> ServerMessage {
        ServerMessage::Built {
            hash: hash.into(),
            errors: vec![],
            warnings: vec![],
        }
    }

    fn client(runtime: FakeRuntime) -> HotReloadClient<FakeRuntime, RecordingHost> {
        HotReloadClient::new(runtime, RecordingHost::default()).with_client_id(42)
    }

    #[tokio::test]
    async fn test_build_cycle_resolves_gate_once() {
        let mut client = client(FakeRuntime::new(Some(&["./app/page.tsx"])));
        assert_eq!(client.overlay().status, BuildStatus::Idle);

        client.process(ServerMessage::Building).await;
        assert_eq!(client.overlay().status, BuildStatus::Building);
        assert_eq!(client.gate(), UpdateGate::Pending { cycle: 1 });
        let pending = client.pending_hot_update();

        client.process(built("a")).await;
        assert_eq!(client.overlay().status, BuildStatus::BuiltOk);
        assert_eq!(client.overlay().refresh_state, RefreshState::Idle);
        assert_eq!(client.overlay().refreshes, 1);
        assert_eq!(client.runtime().current_hash(), "a");
        assert_eq!(client.resolved_cycles(), 1);
        tokio::time::timeout(Duration::from_secs(1), pending.wait())
            .await
            .expect("pending update resolved");

        // Same hash again: nothing to patch, still reported as ok
        client.process(built("a")).await;
        assert_eq!(client.runtime().checks(), 1);
        assert_eq!(client.overlay().status, BuildStatus::BuiltOk);
        assert_eq!(client.resolved_cycles(), 1);
        assert_eq!(client.host().count("client-success"), 2);
        assert_eq!(client.host().count("client-hmr-latency"), 2);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 0);

        let latency = client
            .host()
            .events()
            .into_iter()
            .find(|e| matches!(e, ClientEvent::ClientHmrLatency { .. }))
            .unwrap();
        match latency {
            ClientEvent::ClientHmrLatency {
                id,
                page,
                updated_modules,
                start_time,
                end_time,
                ..
            } => {
                assert_eq!(id, 42);
                assert_eq!(page, "/blog");
                assert_eq!(updated_modules, vec!["./app/page.tsx".to_string()]);
                assert!(end_time > start_time);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_runtime_error_forces_full_reload() {
        let mut client = client(FakeRuntime::new(Some(&["./app/page.tsx"])));
        client.on_unrecoverable_error();
        client.process(ServerMessage::Building).await;
        client.process(built("b")).await;

        assert_eq!(client.runtime().checks(), 0);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 1);
        assert!(client.is_reloading());
        assert!(client.host().events().contains(&ClientEvent::ClientFullReload {
            stack_trace: None,
            had_runtime_error: true,
            dependency_chain: None,
        }));
    }

    #[tokio::test]
    async fn test_no_applicable_patch_reloads() {
        let mut client = client(FakeRuntime::new(None));
        client.process(built("c")).await;

        assert_eq!(client.runtime().checks(), 1);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 1);
        assert_eq!(client.host().count("client-full-reload"), 1);
    }

    #[tokio::test]
    async fn test_busy_runtime_reloads_without_check() {
        let runtime = FakeRuntime::new(Some(&["./app/page.tsx"]));
        *runtime.status.lock() = RuntimeStatus::Abort;
        let mut client = client(runtime);
        client.process(built("d")).await;

        assert_eq!(client.runtime().checks(), 0);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_apply_reports_trimmed_stack() {
        let mut runtime = FakeRuntime::new(Some(&["./app/util.ts"]));
        runtime.fail_apply = true;
        let mut client = client(runtime);
        client.process(built("e")).await;

        let reload = client
            .host()
            .events()
            .into_iter()
            .find(|e| matches!(e, ClientEvent::ClientFullReload { .. }))
            .unwrap();
        match reload {
            ClientEvent::ClientFullReload {
                stack_trace,
                had_runtime_error,
                dependency_chain,
            } => {
                assert_eq!(stack_trace.unwrap().lines().count(), 5);
                assert!(!had_runtime_error);
                assert_eq!(dependency_chain.unwrap().len(), 2);
            }
            _ => unreachable!(),
        }

        // Only one reload even if more messages arrive
        client.process(ServerMessage::ReloadPage).await;
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 1);
        assert_eq!(client.host().count("client-reload-page"), 1);
    }

    #[tokio::test]
    async fn test_errors_surface_first_and_skip_patch() {
        let mut client = client(FakeRuntime::new(Some(&["./app/page.tsx"])));
        client.process(ServerMessage::Building).await;
        client
            .process(ServerMessage::Built {
                hash: "f".into(),
                errors: vec![CompilationMessage::new("first"), CompilationMessage::new("second")],
                warnings: vec![],
            })
            .await;

        assert_eq!(client.overlay().status, BuildStatus::BuiltWithErrors);
        assert_eq!(client.overlay().build_error.as_deref(), Some("first"));
        assert_eq!(client.runtime().checks(), 0);
        assert_eq!(
            client.host().events(),
            vec![ClientEvent::ClientError {
                error_count: 2,
                client_id: 42
            }]
        );
        assert!(matches!(client.gate(), UpdateGate::Pending { .. }));

        client.dismiss();
        assert_eq!(client.overlay().status, BuildStatus::Idle);
    }

    #[tokio::test]
    async fn test_warnings_continue_as_success() {
        let mut client = client(FakeRuntime::new(Some(&[])));
        let warnings = (0..7).map(|i| CompilationMessage::new(format!("warning {}", i))).collect();
        client
            .process(ServerMessage::Built {
                hash: "g".into(),
                errors: vec![],
                warnings,
            })
            .await;

        assert_eq!(client.host().count("client-warning"), 1);
        assert_eq!(client.host().count("client-success"), 1);
        assert_eq!(client.runtime().checks(), 1);
        assert_eq!(client.overlay().status, BuildStatus::BuiltOk);
        // Empty patch: no refresh
        assert_eq!(client.overlay().refreshes, 0);
    }

    #[tokio::test]
    async fn test_server_component_changes_soft_refresh() {
        let mut client = client(FakeRuntime::new(Some(&[])));
        client.process(ServerMessage::ServerComponentChanges).await;
        assert_eq!(client.host().refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 0);
        assert_eq!(client.host().count("server-component-reload-page"), 1);

        client.on_unrecoverable_error();
        client.process(ServerMessage::ServerComponentChanges).await;
        assert_eq!(client.host().refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(client.host().reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_route_changes_and_server_errors() {
        let mut client = client(FakeRuntime::new(Some(&[])));
        client
            .process(ServerMessage::AddedPage {
                data: vec!["/new".into()],
            })
            .await;
        assert_eq!(client.host().refreshes.load(Ordering::SeqCst), 1);

        client
            .process(ServerMessage::server_error("Cannot read config", Some("at load")))
            .await;
        assert_eq!(client.overlay().status, BuildStatus::BuiltWithErrors);
        assert_eq!(
            client.overlay().build_error.as_deref(),
            Some("Cannot read config\nat load")
        );
    }

    #[tokio::test]
    async fn test_handle_text_ignores_foreign_messages() {
        let mut client = client(FakeRuntime::new(Some(&[])));
        assert_eq!(client.handle_text("not json").await, None);
        assert_eq!(client.handle_text(r#"{"event":"ping"}"#).await, None);
        assert_eq!(client.handle_text(r#"{"action":"appIsrManifest","data":{}}"#).await, None);

        let message = client.handle_text(r#"{"action":"building"}"#).await;
        assert_eq!(message, Some(ServerMessage::Building));
        assert_eq!(client.overlay().status, BuildStatus::Building);
    }

    #[tokio::test]
    async fn test_sync_records_version_and_hash() {
        let mut client = client(FakeRuntime::new(Some(&[])));
        client
            .process(ServerMessage::Sync {
                hash: "h".into(),
                errors: vec![],
                warnings: vec![],
                version_info: crate::hot_reload::protocol::VersionInfo::current(),
            })
            .await;
        assert_eq!(client.most_recent_hash(), Some("h"));
        assert!(client.overlay().version_info.is_some());
        assert_eq!(client.overlay().status, BuildStatus::BuiltOk);
        assert_eq!(client.runtime().checks(), 0);
    }
}
