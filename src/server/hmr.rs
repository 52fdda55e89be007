//! HMR WebSocket endpoint

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::ServerState;
use crate::hot_reload::ClientEvent;

/// Handle WebSocket upgrade for HMR
pub async fn hmr_websocket(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(|socket| handle_hmr_socket(socket, state))
}

async fn handle_hmr_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no build announced in between is lost
    let mut hmr_rx = state.hmr_tx.subscribe();

    let sync = state.latest.read().as_ref().map(|snapshot| snapshot.sync_message());
    if let Some(sync) = sync {
        if let Ok(json) = serde_json::to_string(&sync) {
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
    }

    debug!("HMR client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let message = match hmr_rx.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("HMR client lagged behind by {} messages", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    log_client_event(&text);
                }
                Message::Close(_) => {
                    debug!("HMR client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    debug!("HMR connection closed");
}

/// Parse and log a telemetry message from a client
pub fn log_client_event(text: &str) -> Option<ClientEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            debug!("Unrecognized HMR client message {}: {}", text, err);
            return None;
        }
    };

    match &event {
        ClientEvent::ClientError { error_count, client_id } => {
            warn!("Client {} shows {} build error(s)", client_id, error_count);
        }
        ClientEvent::ClientWarning { warning_count, client_id } => {
            debug!("Client {} shows {} build warning(s)", client_id, warning_count);
        }
        ClientEvent::ClientFullReload {
            stack_trace,
            had_runtime_error,
            dependency_chain,
        } => {
            let reason = if *had_runtime_error {
                "after a runtime error"
            } else {
                "because a hot update could not be applied"
            };
            warn!("Client performed a full reload {}", reason);
            if let Some(stack_trace) = stack_trace {
                debug!("{}", stack_trace);
            }
            if let Some(chain) = dependency_chain {
                debug!("Dependency chain: {}", chain.join(" -> "));
            }
        }
        ClientEvent::ClientHmrLatency {
            page,
            start_time,
            end_time,
            updated_modules,
            ..
        } => {
            info!(
                "Fast Refresh of {} took {}ms ({} modules)",
                page,
                end_time.saturating_sub(*start_time),
                updated_modules.len()
            );
        }
        ClientEvent::ClientSuccess { .. }
        | ClientEvent::ClientReloadPage { .. }
        | ClientEvent::ServerComponentReloadPage { .. } => {
            debug!("HMR client event: {:?}", event);
        }
    }
    Some(event)
}
