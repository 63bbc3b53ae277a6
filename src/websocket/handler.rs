//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and runs the per-connection
//! receive/send loops that feed the relay hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::hub::{Peer, RelayHub};
use super::messages::InboundFrame;
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// Entry point for every peer, device and browser alike. Everyone starts
/// out as a client.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();

    // Send capability for this connection
    let (peer, mut rx) = hub.connect().await;

    let peer_id_for_send = peer.id().to_string();

    // Task to forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(
                    peer_id = %peer_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let peer_for_recv = peer.clone();

    // Task to receive frames and route them through the hub
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &peer_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        peer_id = %peer_for_recv.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.disconnect(&peer).await;
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(hub: &RelayHub, peer: &Peer, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            tracing::debug!(peer_id = %peer.id(), frame = %text, "Message received");
            hub.route(peer, InboundFrame::parse(text)).await;
            true
        }
        Message::Binary(bytes) => {
            hub.route(peer, InboundFrame::from_bytes(bytes)).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings automatically
            true
        }
        Message::Close(_) => {
            tracing::debug!(peer_id = %peer.id(), "Peer requested close");
            false
        }
    }
}
