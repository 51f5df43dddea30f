use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::AuthError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub username: String,
}

fn error_response(err: AuthError) -> (StatusCode, String) {
    match err {
        AuthError::UserExists => (StatusCode::CONFLICT, err.to_string()),
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, err.to_string()),
        AuthError::Database(e) => {
            error!("Auth database error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
        }
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let expected = state.config.auth.registration_secret.as_deref();
    if expected.is_none_or(|s| s != payload.secret) {
        warn!("Registration rejected: bad secret");
        return Err((StatusCode::UNAUTHORIZED, "Invalid registration secret".to_string()));
    }

    state
        .users
        .create_user(&payload.username, &payload.password)
        .await
        .map_err(error_response)?;

    info!("Registered {}", payload.username);
    let token = state.sessions.issue(&payload.username);
    Ok(Json(TokenResponse { token }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let valid = state
        .users
        .verify_user(&payload.username, &payload.password)
        .await
        .map_err(error_response)?;
    if !valid {
        return Err(error_response(AuthError::InvalidCredentials));
    }

    let token = state.sessions.issue(&payload.username);
    Ok(Json(TokenResponse { token }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()))?;

    let username = state
        .sessions
        .resolve(token)
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid token".to_string()))?;
    Ok(Json(MeResponse { username }))
}
