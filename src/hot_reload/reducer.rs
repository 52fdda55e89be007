//! Overlay state derived from hot update events

use super::protocol::VersionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStatus {
    #[default]
    Idle,
    Building,
    BuiltOk,
    BuiltWithErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    /// A patch with module changes is being applied
    Pending,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayState {
    pub status: BuildStatus,
    /// First error of the last failed build
    pub build_error: Option<String>,
    pub refresh_state: RefreshState,
    pub version_info: Option<VersionInfo>,
    /// Completed refreshes since the client started
    pub refreshes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayAction {
    Building,
    BuildOk,
    BuildError(String),
    BeforeRefresh,
    Refresh,
    VersionInfo(VersionInfo),
    Dismiss,
}

/// Next overlay state. Pure: the same state and action always give the
/// same result.
pub fn reduce(state: &OverlayState, action: OverlayAction) -> OverlayState {
    let mut next = state.clone();
    match action {
        OverlayAction::Building => {
            next.status = BuildStatus::Building;
        }
        OverlayAction::BuildOk => {
            next.status = BuildStatus::BuiltOk;
            next.build_error = None;
        }
        OverlayAction::BuildError(message) => {
            next.status = BuildStatus::BuiltWithErrors;
            next.build_error = Some(message);
        }
        OverlayAction::BeforeRefresh => {
            next.refresh_state = RefreshState::Pending;
        }
        OverlayAction::Refresh => {
            next.refresh_state = RefreshState::Idle;
            next.refreshes += 1;
        }
        OverlayAction::VersionInfo(info) => {
            next.version_info = Some(info);
        }
        OverlayAction::Dismiss => {
            next.status = BuildStatus::Idle;
            next.build_error = None;
        }
    }
    next
}
