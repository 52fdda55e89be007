//! Headless WebSocket driver for [`HotReloadClient`]

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::client::{HostEnvironment, HotReloadClient, HotRuntime, HotUpdateError, RuntimeStatus};
use super::protocol::{ClientEvent, ServerMessage, HMR_ENDPOINT};

/// `ws://host:port/_strata/webpack-hmr`
pub fn hmr_url(host: &str, port: u16) -> String {
    format!("ws://{}:{}{}", host, port, HMR_ENDPOINT)
}

/// Host without a page: telemetry goes to the socket, reloads and refreshes
/// are counted
pub struct HeadlessHost {
    outbox: mpsc::UnboundedSender<ClientEvent>,
    pathname: String,
    reloads: AtomicU64,
    refreshes: AtomicU64,
}

impl HeadlessHost {
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl HostEnvironment for HeadlessHost {
    fn send(&self, event: ClientEvent) {
        if self.outbox.send(event).is_err() {
            debug!("HMR socket closed, dropping client event");
        }
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        info!("Full reload requested for {}", self.pathname);
    }

    fn soft_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        debug!("Soft refresh of {}", self.pathname);
    }

    fn pathname(&self) -> String {
        self.pathname.clone()
    }
}

/// Runtime that adopts every announced build without replacing modules
#[derive(Debug, Default)]
pub struct HeadlessRuntime {
    hash: Mutex<String>,
    target: Mutex<Option<String>>,
}

#[async_trait]
impl HotRuntime for HeadlessRuntime {
    fn current_hash(&self) -> String {
        self.hash.lock().clone()
    }

    fn status(&self) -> RuntimeStatus {
        RuntimeStatus::Idle
    }

    async fn check(&self, hash: &str) -> Result<Option<Vec<String>>, HotUpdateError> {
        *self.target.lock() = Some(hash.to_string());
        Ok(Some(Vec::new()))
    }

    async fn apply(&self) -> Result<Vec<String>, HotUpdateError> {
        if let Some(target) = self.target.lock().take() {
            *self.hash.lock() = target;
        }
        Ok(Vec::new())
    }
}

type SocketStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A [`HotReloadClient`] attached to a dev server socket
pub struct HeadlessClient<R> {
    client: HotReloadClient<R, HeadlessHost>,
    stream: SocketStream,
    writer: JoinHandle<()>,
}

/// Connect to a dev server's HMR endpoint
pub async fn connect<R: HotRuntime>(url: &str, runtime: R, pathname: &str) -> Result<HeadlessClient<R>> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    let (mut sink, stream) = socket.split();
    let (outbox, mut events) = mpsc::unbounded_channel::<ClientEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let host = HeadlessHost {
        outbox,
        pathname: pathname.to_string(),
        reloads: AtomicU64::new(0),
        refreshes: AtomicU64::new(0),
    };
    debug!("Connected to {}", url);

    Ok(HeadlessClient {
        client: HotReloadClient::new(runtime, host),
        stream,
        writer,
    })
}

impl<R: HotRuntime> HeadlessClient<R> {
    pub fn client(&self) -> &HotReloadClient<R, HeadlessHost> {
        &self.client
    }

    /// Process messages until one with a known action arrives. `None` once
    /// the socket is closed.
    pub async fn next(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(frame) = self.stream.next().await {
            match frame.context("HMR socket error")? {
                Message::Text(text) => {
                    if let Some(message) = self.client.handle_text(&text).await {
                        return Ok(Some(message));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Process messages until the server goes away
    pub async fn run(mut self) -> Result<()> {
        while let Some(message) = self.next().await? {
            debug!("Processed {}", message.action());
        }
        Ok(())
    }
}

impl<R> Drop for HeadlessClient<R> {
    fn drop(&mut self) {
        self.writer.abort();
    }
}
