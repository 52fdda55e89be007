//! Development server with Hot Module Replacement
//!
//! Provides a local development server with:
//! - Emitted asset serving
//! - WebSocket-based HMR on [`HMR_ENDPOINT`]
//! - File watching and incremental rebuilds

mod context_cache;
mod hmr;
mod rebuild;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::bundler::Bundler;
use crate::cache::FileSystemCache;
use crate::cli::DevServerOptions;
use crate::config::Config;
use crate::entries::Target;
use crate::hot_reload::{ServerMessage, HMR_ENDPOINT};
use crate::utils::format_duration;

pub use context_cache::{ModuleContext, ModuleContextCache};
pub use hmr::log_client_event;
pub use rebuild::{needs_page_reload, rebuild_messages, route_pages, BuildSnapshot};

/// Directories never worth a rebuild
const IGNORED_DIRS: [&str; 3] = ["node_modules", ".git", "target"];

/// Shared server state
struct ServerState {
    /// HMR broadcast channel
    hmr_tx: broadcast::Sender<ServerMessage>,

    /// Last build announced to clients
    latest: RwLock<Option<BuildSnapshot>>,

    /// Edge module contexts, dropped when their files change
    contexts: ModuleContextCache,
}

/// Development server
pub struct DevServer {
    bundler: Bundler,
    options: DevServerOptions,
    out_dir: PathBuf,
    state: Arc<ServerState>,
}

impl DevServer {
    /// Create a new development server
    pub fn new(config: Config, options: DevServerOptions) -> Result<Self> {
        let out_dir = options.out_dir.clone().unwrap_or_else(|| config.output_dir());
        let (hmr_tx, _) = broadcast::channel::<ServerMessage>(100);
        let cache = FileSystemCache::new(out_dir.join("cache"));
        Ok(Self {
            bundler: Bundler::new(config, true).with_cache(Arc::new(cache)),
            options,
            out_dir,
            state: Arc::new(ServerState {
                hmr_tx,
                latest: RwLock::new(None),
                contexts: ModuleContextCache::new(),
            }),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn contexts(&self) -> &ModuleContextCache {
        &self.state.contexts
    }

    /// Receive every message broadcast to HMR clients
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.state.hmr_tx.subscribe()
    }

    pub fn latest(&self) -> Option<BuildSnapshot> {
        self.state.latest.read().clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(HMR_ENDPOINT, get(hmr::hmr_websocket))
            .fallback_service(ServeDir::new(&self.out_dir))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    fn broadcast(&self, message: ServerMessage) {
        debug!("Broadcasting {}", message.action());
        // No receivers just means no client is connected
        let _ = self.state.hmr_tx.send(message);
    }

    /// Build everything, write it out and remember what clients should see
    pub async fn initial_build(&self) -> Result<BuildSnapshot> {
        let output = self.bundler.build().await?;
        output.write(&self.out_dir).await?;
        if let Some(edge) = output.compilation(Target::EdgeServer) {
            self.state.contexts.record(edge);
        }

        let snapshot = BuildSnapshot::from_output(&output);
        for error in &snapshot.errors {
            eprintln!("  {} {}", "✗".red(), error.message);
        }
        *self.state.latest.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Rebuild after `changed` files were modified and announce the result.
    /// Returns the messages sent after `building`.
    pub async fn rebuild(&self, changed: Vec<PathBuf>) -> Result<Vec<ServerMessage>> {
        if needs_page_reload(&changed, &self.bundler.dirs().root_dir) {
            self.state.contexts.invalidate_all();
        } else {
            for path in &changed {
                self.state.contexts.invalidate(path);
            }
        }

        self.broadcast(ServerMessage::Building);

        let output = match self.bundler.build().await {
            Ok(output) => output,
            Err(err) => {
                error!("Rebuild failed: {:#}", err);
                let message = ServerMessage::server_error(&format!("{:#}", err), None);
                self.broadcast(message.clone());
                return Ok(vec![message]);
            }
        };
        output.write(&self.out_dir).await?;
        if let Some(edge) = output.compilation(Target::EdgeServer) {
            self.state.contexts.record(edge);
        }

        let next = BuildSnapshot::from_output(&output);
        let previous = self.state.latest.read().clone().unwrap_or_default();
        let messages = rebuild_messages(
            &previous,
            &next,
            &changed,
            &self.bundler.dirs().root_dir,
            self.bundler.dirs().app_dir.as_deref(),
        );
        *self.state.latest.write() = Some(next);

        for message in &messages {
            self.broadcast(message.clone());
        }
        info!("Rebuilt in {}", format_duration(output.duration));
        Ok(messages)
    }

    /// Start the development server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = tokio::net::lookup_host((self.options.host.as_str(), self.options.port))
            .await?
            .next()
            .with_context(|| format!("Cannot resolve {}", self.options.host))?;
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on http://{}", addr);

        Arc::new(self).serve(listener).await
    }

    /// Build, watch and serve on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let snapshot = self.initial_build().await?;
        eprintln!(
            "  {} Compiled {} route(s) {}",
            "✓".green().bold(),
            snapshot.pages.len(),
            snapshot.hash.dimmed()
        );

        if self.options.hmr {
            let changes = self.setup_file_watcher()?;
            tokio::spawn(self.clone().process_changes(changes));
        }

        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn process_changes(self: Arc<Self>, mut changes: mpsc::UnboundedReceiver<Vec<PathBuf>>) {
        while let Some(paths) = changes.recv().await {
            for path in &paths {
                eprintln!(
                    "  {} File changed: {}",
                    "↻".yellow(),
                    path.display().to_string().dimmed()
                );
            }
            if let Err(err) = self.rebuild(paths).await {
                error!("Rebuild failed: {:#}", err);
            }
        }
    }

    /// Set up file watching for HMR
    fn setup_file_watcher(&self) -> Result<mpsc::UnboundedReceiver<Vec<PathBuf>>> {
        let root = self.bundler.dirs().root_dir.clone();
        let out_dir = self.out_dir.clone();

        // Use a debouncer to avoid too many events
        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_millis(self.bundler.config().dev.debounce_ms), tx)?;
        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();

        // The debouncer is moved into the thread to keep it alive
        std::thread::spawn(move || {
            let _debouncer = debouncer;

            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        let paths: Vec<PathBuf> = events
                            .into_iter()
                            .map(|event| event.path)
                            .filter(|path| is_relevant(path, &out_dir))
                            .collect();
                        if !paths.is_empty() && changes_tx.send(paths).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {:?}", e);
                    }
                    Err(_) => {
                        // Channel closed, exit
                        break;
                    }
                }
            }
        });

        Ok(changes_rx)
    }
}

/// Whether a changed path can affect the build
fn is_relevant(path: &Path, out_dir: &Path) -> bool {
    if path.starts_with(out_dir) {
        return false;
    }
    !path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map_or(false, |name| IGNORED_DIRS.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let write = |path: &str, content: &str| {
            let file = dir.path().join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        };
        write("app/layout.tsx", "export default function Layout({ children }) { return children }\n");
        write("app/page.tsx", "export default function Page() { return null }\n");
        write("middleware.ts", "export function middleware() {}\n");
        dir
    }

    fn server(root: &Path) -> DevServer {
        let mut config = Config::default_config();
        config.root = root.to_path_buf();
        DevServer::new(
            config,
            DevServerOptions {
                host: "127.0.0.1".into(),
                port: 0,
                hmr: false,
                out_dir: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_ignored_paths() {
        let out = Path::new("/p/.strata");
        assert!(is_relevant(Path::new("/p/app/page.tsx"), out));
        assert!(!is_relevant(Path::new("/p/.strata/server/page.js"), out));
        assert!(!is_relevant(Path::new("/p/node_modules/react/index.js"), out));
    }

    #[tokio::test]
    async fn test_rebuild_announces_new_page() {
        let dir = project();
        let server = server(dir.path());
        let snapshot = server.initial_build().await.unwrap();
        assert!(snapshot.pages.contains("/"));
        assert!(server.contexts().contains("middleware"));

        let mut rx = server.subscribe();
        let page = dir.path().join("app/blog/page.tsx");
        fs::create_dir_all(page.parent().unwrap()).unwrap();
        fs::write(&page, "export default function Blog() { return null }\n").unwrap();

        let messages = server.rebuild(vec![page]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::Building);
        assert_eq!(
            messages[0],
            ServerMessage::AddedPage {
                data: vec!["/blog".into()]
            }
        );
        assert!(server.latest().unwrap().pages.contains("/blog"));
    }

    #[tokio::test]
    async fn test_middleware_change_reloads_and_clears_contexts() {
        let dir = project();
        let server = server(dir.path());
        server.initial_build().await.unwrap();

        let middleware = dir.path().join("middleware.ts");
        fs::write(&middleware, "export function middleware() { return null }\n").unwrap();
        let messages = server.rebuild(vec![middleware]).await.unwrap();
        assert_eq!(messages, vec![ServerMessage::ReloadPage]);
        // Recorded again from the fresh edge compilation
        assert!(server.contexts().contains("middleware"));
    }
}
