/**
 * WebSocket Endpoint
 *
 * `GET /ws/{channel}?client_id=...` upgrades into a fabric
 * subscription. Unknown channels close with 1008 immediately after the
 * upgrade. Each connection runs two halves: a writer task draining the
 * client's frame queue into the socket, and a reader loop serving the
 * minimal control protocol (`ping`, `get_stats`, echo).
 */

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::channels::{ConnectionManager, Envelope, FabricStats};

/// Close code for a channel outside the allow-list
const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Upgrade handler for `/ws/{channel}`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    Query(params): Query<WsParams>,
    State(manager): State<Arc<ConnectionManager>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, manager, channel, params.client_id))
}

/// Fabric statistics for `GET /ws/stats`
pub async fn ws_stats(State(manager): State<Arc<ConnectionManager>>) -> Json<FabricStats> {
    Json(manager.stats().await)
}

async fn handle_socket(
    mut socket: WebSocket,
    manager: Arc<ConnectionManager>,
    channel: String,
    requested_id: Option<String>,
) {
    if !manager.is_allowed(&channel) {
        tracing::warn!("[Channels] Rejecting connection to unknown channel '{}'", channel);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: format!("Invalid channel: {channel}").into(),
            })))
            .await;
        return;
    }

    let Ok((client_id, mut frames)) = manager.connect(&channel, requested_id).await else {
        // Allow-list already checked; connect only fails on that
        return;
    };

    let (mut sink, mut stream) = socket.split();

    // Writer half: drain the bounded queue into the socket. Lag means
    // the client was too slow and lost its oldest frames.
    let writer = {
        let channel = channel.clone();
        let client_id = client_id.clone();
        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            subsystem = "channels",
                            channel = %channel,
                            client_id = %client_id,
                            skipped,
                            "slow consumer dropped oldest frames"
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // Reader half: the control protocol
    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(text)) => {
                let frame: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(_) => serde_json::json!({ "raw": text.as_str() }),
                };
                let reply = match frame.get("type").and_then(|t| t.as_str()) {
                    Some("ping") => Envelope::pong(),
                    Some("get_stats") => {
                        let stats = manager.stats().await;
                        match serde_json::to_value(&stats) {
                            Ok(data) => Envelope::stats(data),
                            Err(_) => Envelope::pong(),
                        }
                    }
                    _ => Envelope::echo(frame),
                };
                manager.send_to_client(&channel, &client_id, &reply).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by the transport; binary frames ignored
            Ok(_) => {}
        }
    }

    writer.abort();
    manager.disconnect(&channel, &client_id).await;
}
