//! WebSocket lifecycle: authenticate, bind the session, pump frames.
//!
//! Each accepted socket becomes a task pair. The writer drains the
//! session's bounded queue; the reader parses envelopes under a heartbeat
//! deadline. Closing a socket never mutates lobby or game state directly;
//! it only reports the loss to the connection manager.

use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::dispatch;
use crate::sessions::OUTBOUND_QUEUE;
use crate::AppState;

/// Clients ping every 30 seconds; a socket silent for two intervals is
/// considered dead.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.sessions.live_count() >= state.config.max_connections {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let authed = query
        .token
        .as_deref()
        .and_then(|token| state.auth.verify(token).ok());

    ws.on_upgrade(move |socket| async move {
        match authed {
            Some(user) => handle_socket(socket, state, user.user_id, user.username).await,
            None => reject_socket(socket).await,
        }
    })
}

/// An unauthenticated socket is closed with a policy violation before any
/// message flows.
async fn reject_socket(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "Invalid or missing token".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String, username: String) {
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);
    let binding = state.sessions.bind(&user_id, &username, tx);

    tracing::info!(session = %binding.session_id, %username, rebound = binding.rebound, "socket bound");

    dispatch::on_connected(&state, &binding);

    let (mut sink, mut stream) = socket.split();

    // Writer: forward the session queue onto the socket. Ends when the
    // queue's sender is dropped, either on disconnect or when a newer
    // socket takes the session over.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };

            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }

        let _ = sink.close().await;
    });

    // Reader: parse envelopes under the heartbeat deadline.
    let deadline = PING_INTERVAL * 2;

    loop {
        let frame = match tokio::time::timeout(deadline, stream.next()).await {
            Err(_) => {
                tracing::info!(session = %binding.session_id, "heartbeat lapsed, dropping socket");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                state.sessions.touch(&binding.session_id);

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => dispatch::handle_message(&state, &binding.session_id, message),
                    Err(err) => dispatch::deliver(
                        &state,
                        &binding.session_id,
                        &ServerMessage::Error {
                            message: format!("Invalid message: {err}"),
                        },
                    ),
                }
            }
            Message::Close(_) => break,
            // Protocol-level pings are answered by the transport; the
            // application heartbeat is the JSON Ping envelope.
            _ => continue,
        }
    }

    writer.abort();
    dispatch::on_socket_closed(&state, &binding.session_id, binding.epoch);

    tracing::info!(session = %binding.session_id, "socket closed");
}
