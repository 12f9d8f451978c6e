//! WebSocket control channel.
//!
//! Each socket task owns one [`Connection`]. Frames queued on the
//! connection by the coordinator are written to the socket; frames read
//! from the socket are parsed and forwarded to the coordinator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use tokio::sync::mpsc;

use super::coordinator::{CoordinatorHandle, Event};
use super::protocol::ClientMessage;
use super::session::Connection;
use crate::state::AppState;

/// Handle WebSocket upgrade for the control channel.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let (tx, mut outgoing) = mpsc::unbounded_channel::<String>();
    let connection = Connection::new(addr.ip(), tx);
    let mut registered = false;
    tracing::debug!(remote = %addr, connection = %connection.id, "Control socket opened");

    loop {
        tokio::select! {
            Some(frame) = outgoing.recv() => {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        registered |= forward(&state.coordinator, &connection, registered, text.as_str());
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(remote = %addr, connection = %connection.id, "Control socket closed");
    drop(outgoing);
    state.coordinator.send(Event::SessionClosed {
        connection: connection.id,
    });
}

/// Forward one text frame. Returns `true` if it registered the connection.
///
/// The first `register` on a socket creates its session; later ones rename it.
fn forward(
    coordinator: &CoordinatorHandle,
    connection: &Connection,
    registered: bool,
    text: &str,
) -> bool {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Register { jsid }) if !registered => {
            coordinator.send(Event::SessionRegistered {
                jsid,
                connection: connection.clone(),
            });
            true
        }
        Ok(message) => {
            coordinator.send(Event::SessionMessage {
                connection: connection.id,
                message,
            });
            false
        }
        Err(e) => {
            tracing::debug!(
                remote = %connection.remote_addr,
                error = %e,
                "Ignoring malformed control message"
            );
            false
        }
    }
}
