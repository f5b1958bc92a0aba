//! Account registration, login, and profile endpoints.
//!
//! These sit outside the realtime path: clients authenticate here once,
//! then carry the issued token to the WebSocket handshake.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::chat::store;
use crate::db;
use crate::db::models::User;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public view of a user row; never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub message_color: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            message_color: user.message_color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserResponse,
}

/// POST /api/auth/register — Create an account and log it in.
/// Body: { "username", "email", "password" }.
/// 400 on empty fields or short password, 409 on username/email conflict.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let username = body.username.trim().to_string();
    let email = body.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || body.password.len() < MIN_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let password = body.password;
    let user = tokio::task::spawn_blocking(move || -> Result<User, StatusCode> {
        // Hash before taking the lock; bcrypt is the slow part.
        let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let taken = store::find_user_by_username(&conn, &username)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if taken.is_some() {
            return Err(StatusCode::CONFLICT);
        }
        let taken = store::find_user_by_email(&conn, &email)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if taken.is_some() {
            return Err(StatusCode::CONFLICT);
        }

        store::create_user(&conn, &username, &email, &hash)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    let access_token = jwt::issue_access_token(&state.jwt_secret, &user.id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

/// POST /api/auth/login — Verify credentials and issue a token.
/// 401 on unknown username or wrong password, indistinguishably.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let db = state.db.clone();
    let username = body.username.trim().to_string();
    let password = body.password;

    let user = tokio::task::spawn_blocking(move || -> Result<User, StatusCode> {
        let user = {
            let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            store::find_user_by_username(&conn, &username)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .ok_or(StatusCode::UNAUTHORIZED)?
        };

        // Lock released before the bcrypt verify
        let valid = bcrypt::verify(&password, &user.password_hash)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !valid {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(user)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let access_token = jwt::issue_access_token(&state.jwt_secret, &user.id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

/// GET /api/auth/profile — The authenticated user's own record.
pub async fn get_profile(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserResponse>, StatusCode> {
    let user_id = claims.sub;
    let user = db::with_store(&state.db, move |c| store::find_user(c, &user_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub message_color: Option<String>,
}

/// PUT /api/auth/profile — Update profile fields (currently messageColor).
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    let user_id = claims.sub;

    let user = db::with_store(&state.db, move |c| match body.message_color {
        Some(color) => store::update_message_color(c, &user_id, &color),
        None => store::find_user(c, &user_id),
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user.into()))
}
