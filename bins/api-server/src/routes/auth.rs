use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use dash_core::{AuthError, Session};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::envelope::{failure, unauthorized, ApiResponse};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    username: String,
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    username: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_admin: bool,
}

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(raw) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(bearer) = raw.trim().strip_prefix("Bearer ") {
            let token = bearer.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

/// Gate for every `/api` route: a valid session for a user that still exists, or 401.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        debug!(path = %request.uri().path(), "request without session token");
        return unauthorized();
    };

    match state.auth.validate(&token) {
        Ok(session) => {
            if !state.store.contains(&session.subject).await {
                debug!(subject = %session.subject, "session for a removed user rejected");
                return unauthorized();
            }
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => {
            let reason = match err {
                AuthError::Expired => "expired",
                AuthError::Malformed => "malformed",
                AuthError::InvalidCredentials => "invalid",
            };
            debug!(path = %request.uri().path(), reason, "session token rejected");
            unauthorized()
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(LoginRequest {
        username: Some(username),
        password: Some(password),
    })) = body
    else {
        return failure(StatusCode::BAD_REQUEST, "username and password are required");
    };

    match state.auth.authenticate(&username, &password).await {
        Ok((token, session)) => {
            let cookie = session_cookie(&token, state.auth.ttl().as_secs());
            let body = ApiResponse::ok(LoginResponse {
                username: session.subject,
                token,
                expires_at: session.expires_at,
            });
            ([(SET_COOKIE, cookie)], Json(body)).into_response()
        }
        Err(_) => {
            warn!("failed login attempt");
            unauthorized()
        }
    }
}

/// Clears the cookie. Tokens are stateless, so a copied bearer token stays
/// valid until it expires.
pub async fn logout() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    ([(SET_COOKIE, cookie)], Json(ApiResponse::ok(()))).into_response()
}

pub async fn session_info(Extension(session): Extension<Session>) -> Response {
    info!(subject = %session.subject, "session lookup");
    let info = SessionInfo {
        is_admin: session.is_admin(),
        username: session.subject,
        issued_at: session.issued_at,
        expires_at: session.expires_at,
    };
    Json(ApiResponse::ok(info)).into_response()
}

fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}
