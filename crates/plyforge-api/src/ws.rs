//! Progress subscriber endpoint.
//!
//! A client opens `GET /ws/{client_id}` with an identifier it generated
//! itself. The server registers a channel for that identifier, forwards hub
//! messages as text frames, and never expects structured messages back; the
//! client keeps the connection alive with no-op receives. The registration
//! is removed on disconnect, but only if it still belongs to this
//! connection, so a reconnect that replaced it is left untouched.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use plyforge_events::progress_channel;
use tracing::info;

use crate::error::ApiError;
use crate::state::ApiState;

/// `GET /ws/{client_id}`: upgrade and attach a progress subscriber.
pub(crate) async fn subscribe(
    State(state): State<Arc<ApiState>>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if client_id.trim().is_empty() {
        return Err(ApiError::bad_request("client identifier must not be empty"));
    }
    Ok(ws.on_upgrade(move |socket| serve_subscriber(socket, state, client_id)))
}

async fn serve_subscriber(mut socket: WebSocket, state: Arc<ApiState>, client_id: String) {
    let (sender, mut receiver) = progress_channel();
    state.hub.register(client_id.clone(), sender.clone());
    info!(client_id = %client_id, "progress subscriber connected");

    loop {
        tokio::select! {
            message = receiver.recv() => {
                match message {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister_channel(&client_id, &sender);
    info!(client_id = %client_id, "progress subscriber disconnected");
}
