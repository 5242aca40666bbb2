//! `GET /api/ws?token=JWT`: live pipeline-run events and digests.
//!
//! Browsers cannot set headers on a websocket handshake, so the token may
//! come as a query param. The socket is bound to the user's stream-hub topic
//! and forwards every JSON value published there as a text frame.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::kernel::{user_topic, StreamHub};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::{authenticate_token, AuthError, AuthUser};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<AxumAppState>,
    Query(query): Query<WsQuery>,
    header_auth: Option<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = match (query.token, header_auth) {
        (Some(token), _) => authenticate_token(&token, &state.deps.jwt_service)?,
        (None, Some(user)) => user,
        (None, None) => return Err(AuthError::MissingToken.into()),
    };

    let hub = state.deps.stream_hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user)))
}

async fn handle_socket(socket: WebSocket, hub: StreamHub, user: AuthUser) {
    let topic = user_topic(user.user_id);
    let mut rx = hub.subscribe(&topic).await;
    tracing::info!(user_id = %user.user_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    let hello = serde_json::json!({"type": "connected", "user_id": user.user_id.to_string()});
    if sink.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    let sender_user = user.user_id;
    let send_task = tokio::spawn(async move {
        loop {
            let value = match rx.recv().await {
                Ok(value) => value,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    serde_json::json!({"type": "lagged", "missed": missed})
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if sink.send(Message::Text(value.to_string())).await.is_err() {
                tracing::debug!(user_id = %sender_user, "websocket sink closed");
                break;
            }
        }
    });

    // Inbound frames are ignored; the socket is server-push only.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(user_id = %user.user_id, error = %e, "websocket receive error");
                break;
            }
        }
    }

    send_task.abort();
    hub.cleanup().await;
    tracing::info!(user_id = %user.user_id, "websocket disconnected");
}
