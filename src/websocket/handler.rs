use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::websocket::relay::CollabRelay;
use crate::ws::{ConnCtx, RelayError};
use crate::AppState;

/// WebSocket handler for `/collab/:doc_id`
pub async fn websocket_handler(
    Path(doc_id): Path<String>,
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt for document {}", doc_id);
    ws.max_message_size(app_state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, doc_id, app_state))
}

/// Runs the relay's disconnect sequence when the connection task ends,
/// however it ends.
struct DisconnectGuard {
    relay: CollabRelay,
    conn: ConnCtx,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.relay.disconnect(&self.conn);
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, doc_id: String, app_state: AppState) {
    let (conn, mut outbox) = ConnCtx::with_capacity(doc_id, app_state.config.outbox_capacity);
    info!(
        "WebSocket connection established for document {} with connection id {}",
        conn.doc_id, conn.id
    );

    // Split the socket; the writer task owns the sink
    let (mut sender, mut receiver) = socket.split();

    let relay = app_state.relay.clone();
    relay.connect(&conn);
    let guard = DisconnectGuard {
        relay: relay.clone(),
        conn: conn.clone(),
    };

    // Drain this connection's queue into the socket
    let writer_id = conn.id;
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize message for {}: {}", writer_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("Socket for {} closed while sending", writer_id);
                break;
            }
        }
        let _ = sender.close().await;
    });

    let idle_timeout = app_state.config.idle_timeout();
    loop {
        tokio::select! {
            frame = next_frame(&mut receiver, idle_timeout) => match frame {
                Some(Ok(Message::Text(text))) => relay.handle_text(&conn, &text),
                // Some clients send the JSON envelope as a binary frame
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => relay.handle_text(&conn, text),
                    Err(_) => CollabRelay::reject(&conn, RelayError::InvalidPayload),
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket error on connection {}: {}", conn.id, e);
                    break;
                }
            },
            _ = &mut send_task => {
                debug!("Writer for connection {} finished", conn.id);
                break;
            }
            _ = conn.stalled() => {
                warn!("Closing stalled connection {}", conn.id);
                break;
            }
        }
    }

    drop(guard);
    send_task.abort();
    info!("WebSocket connection {} terminated", conn.id);
}

/// Next frame from the client. An elapsed idle timeout reads as end of
/// stream, so it is handled exactly like a disconnect.
async fn next_frame(
    receiver: &mut SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) -> Option<Result<Message, axum::Error>> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                info!("Closing idle connection after {:?}", limit);
                None
            }
        },
        None => receiver.next().await,
    }
}
