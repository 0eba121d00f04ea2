//! WebSocket endpoint for real-time updates.
//!
//! The server only pushes; client messages are ignored. A dead peer is
//! detected on the next send, which detaches the session from the hub.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::decode_user_id;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match decode_user_id(&state.jwt_secret, &params.token) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("WebSocket auth failed: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match state.db.get_user(user_id).await {
        Ok(Some(user)) if user.is_active => {}
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, state, user_id))
}

async fn handle_websocket(mut socket: WebSocket, state: AppState, user_id: Uuid) {
    let (session_id, mut rx) = state.hub.attach(user_id);

    while let Some(payload) = rx.recv().await {
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    state.hub.detach(user_id, session_id);
}
