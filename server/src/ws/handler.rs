use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::chat::store;
use crate::db;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the WebSocket connection. Auth is via ?token=JWT —
/// browsers cannot set headers on WebSocket upgrades.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid or unresolvable user
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. On auth failure, upgrades then immediately
/// closes with the appropriate close code and no payload. On success,
/// spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };
            tracing::warn!(close_code, reason, "WebSocket auth failed");
            return ws.on_upgrade(move |socket| close_with(socket, close_code, reason));
        }
    };

    // Resolve the token subject to a live user row. A token whose user no
    // longer exists is treated the same as an invalid one.
    let user_id = claims.sub.clone();
    let user = db::with_store(&state.db, move |conn| store::find_user(conn, &user_id)).await;

    match user {
        Ok(Some(user)) => {
            tracing::info!(
                user_id = %user.id,
                username = %user.username,
                "WebSocket connection authenticated"
            );
            let identity = user.identity();
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, identity))
        }
        Ok(None) => {
            tracing::warn!(user_id = %claims.sub, "WebSocket auth failed: user not found");
            ws.on_upgrade(move |socket| close_with(socket, CLOSE_TOKEN_INVALID, "Token invalid"))
        }
        Err(e) => {
            tracing::error!(error = %e, "WebSocket auth failed: user lookup error");
            ws.on_upgrade(move |socket| close_with(socket, CLOSE_TOKEN_INVALID, "Token invalid"))
        }
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
