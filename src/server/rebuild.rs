//! What connected clients are told after a rebuild

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::bundler::BuildOutput;
use crate::entries::Target;
use crate::hot_reload::{CompilationMessage, ServerMessage, VersionInfo};
use crate::routes::DiscoveredRoutes;
use crate::utils::normalize_app_path;

/// The parts of a build the dev server remembers between rebuilds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSnapshot {
    pub hash: String,
    /// Hash of the browser compilation alone
    pub client_hash: String,
    pub errors: Vec<CompilationMessage>,
    pub warnings: Vec<CompilationMessage>,
    pub pages: BTreeSet<String>,
}

impl BuildSnapshot {
    pub fn from_output(output: &BuildOutput) -> Self {
        Self {
            hash: output.hash.clone(),
            client_hash: output
                .compilation(Target::Client)
                .map(|client| client.hash.clone())
                .unwrap_or_default(),
            errors: output.errors().map(CompilationMessage::from).collect(),
            warnings: output.warnings().map(CompilationMessage::from).collect(),
            pages: route_pages(&output.routes),
        }
    }

    /// Sent to a client right after it connects
    pub fn sync_message(&self) -> ServerMessage {
        ServerMessage::Sync {
            hash: self.hash.clone(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            version_info: VersionInfo::current(),
        }
    }

    pub fn built_message(&self) -> ServerMessage {
        ServerMessage::Built {
            hash: self.hash.clone(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Pages and app routes as URL paths
pub fn route_pages(routes: &DiscoveredRoutes) -> BTreeSet<String> {
    let pages = routes.pages.iter().flat_map(|pages| pages.keys().cloned());
    let app = routes
        .app
        .iter()
        .flat_map(|app| app.keys())
        .map(|page| normalize_app_path(page));
    pages.chain(app).collect()
}

/// Changes that invalidate the whole page rather than a module
fn requires_reload(path: &Path, root_dir: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return false;
    };
    if stem == "_document" {
        return true;
    }
    let parent = path.parent();
    let at_root = parent == Some(root_dir) || parent == Some(root_dir.join("src").as_path());
    at_root && (stem == "middleware" || stem == "instrumentation")
}

/// Whether any change needs a full page reload: `_document`, middleware
/// or instrumentation
pub fn needs_page_reload(changed: &[PathBuf], root_dir: &Path) -> bool {
    changed.iter().any(|path| requires_reload(path, root_dir))
}

/// Messages announcing `next`, given what clients last saw
pub fn rebuild_messages(
    previous: &BuildSnapshot,
    next: &BuildSnapshot,
    changed: &[PathBuf],
    root_dir: &Path,
    app_dir: Option<&Path>,
) -> Vec<ServerMessage> {
    let mut messages = Vec::new();

    let added: Vec<String> = next.pages.difference(&previous.pages).cloned().collect();
    if !added.is_empty() {
        messages.push(ServerMessage::AddedPage { data: added });
    }
    let removed: Vec<String> = previous.pages.difference(&next.pages).cloned().collect();
    if !removed.is_empty() {
        messages.push(ServerMessage::RemovedPage { data: removed });
    }

    if !next.errors.is_empty() {
        messages.push(next.built_message());
        return messages;
    }

    if needs_page_reload(changed, root_dir) {
        messages.push(ServerMessage::ReloadPage);
        return messages;
    }

    let server_only = !changed.is_empty()
        && next.client_hash == previous.client_hash
        && app_dir.map_or(false, |app_dir| changed.iter().all(|path| path.starts_with(app_dir)));
    if server_only {
        messages.push(ServerMessage::ServerComponentChanges);
    } else {
        messages.push(next.built_message());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(hash: &str, client_hash: &str, pages: &[&str]) -> BuildSnapshot {
        BuildSnapshot {
            hash: hash.into(),
            client_hash: client_hash.into(),
            pages: pages.iter().map(|p| p.to_string()).collect(),
            ..BuildSnapshot::default()
        }
    }

    const ROOT: &str = "/project";
    const APP: &str = "/project/app";

    fn messages(previous: &BuildSnapshot, next: &BuildSnapshot, changed: &[&str]) -> Vec<ServerMessage> {
        let changed: Vec<PathBuf> = changed.iter().map(PathBuf::from).collect();
        rebuild_messages(previous, next, &changed, Path::new(ROOT), Some(Path::new(APP)))
    }

    #[test]
    fn test_route_set_changes() {
        let previous = snapshot("a", "c1", &["/", "/about"]);
        let next = snapshot("b", "c2", &["/", "/blog"]);
        assert_eq!(
            messages(&previous, &next, &["/project/pages/blog.tsx"]),
            vec![
                ServerMessage::AddedPage {
                    data: vec!["/blog".into()]
                },
                ServerMessage::RemovedPage {
                    data: vec!["/about".into()]
                },
                next.built_message(),
            ]
        );
    }

    #[test]
    fn test_server_component_only_change() {
        let previous = snapshot("a", "c1", &["/"]);
        let next = snapshot("b", "c1", &["/"]);
        assert_eq!(
            messages(&previous, &next, &["/project/app/page.tsx"]),
            vec![ServerMessage::ServerComponentChanges]
        );

        // Client output changed too
        let next = snapshot("b", "c2", &["/"]);
        assert_eq!(messages(&previous, &next, &["/project/app/page.tsx"]), vec![next.built_message()]);

        // Outside the app directory
        let next = snapshot("b", "c1", &["/"]);
        assert_eq!(messages(&previous, &next, &["/project/lib/db.ts"]), vec![next.built_message()]);
    }

    #[test]
    fn test_errors_and_reload_triggers() {
        let previous = snapshot("a", "c1", &["/"]);
        let mut next = snapshot("b", "c1", &["/"]);
        assert_eq!(
            messages(&previous, &next, &["/project/middleware.ts"]),
            vec![ServerMessage::ReloadPage]
        );
        assert_eq!(
            messages(&previous, &next, &["/project/pages/_document.tsx"]),
            vec![ServerMessage::ReloadPage]
        );

        next.errors.push(CompilationMessage::new("Module not found"));
        assert_eq!(
            messages(&previous, &next, &["/project/app/page.tsx"]),
            vec![next.built_message()]
        );
    }
}
