use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use dash_core::{Session, StoreError, ADMIN_USERNAME};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::envelope::failure;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users", get(list_users).post(add_user).delete(delete_user))
}

#[derive(Debug, Serialize)]
struct UserList {
    success: bool,
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    username: Option<String>,
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Protected(_) => StatusCode::FORBIDDEN,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
    }
}

fn forbidden(session: &Session) -> Option<Response> {
    if session.is_admin() {
        return None;
    }
    warn!(subject = %session.subject, "non-admin attempted user management");
    Some(failure(StatusCode::FORBIDDEN, "admin privileges required"))
}

async fn list_response(state: &AppState, status: StatusCode) -> Response {
    let body = UserList {
        success: true,
        users: state.store.usernames().await,
    };
    (status, Json(body)).into_response()
}

async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Response {
    if let Some(denied) = forbidden(&session) {
        return denied;
    }
    list_response(&state, StatusCode::OK).await
}

async fn add_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Response {
    if let Some(denied) = forbidden(&session) {
        return denied;
    }
    let Ok(Json(NewUser {
        username: Some(username),
        password: Some(password),
    })) = body
    else {
        return failure(StatusCode::BAD_REQUEST, "username and password are required");
    };

    match state.store.add(&username, &password).await {
        Ok(()) => {
            info!(subject = %session.subject, username = %username, "user added");
            list_response(&state, StatusCode::CREATED).await
        }
        Err(err) => failure(store_status(&err), err.to_string()),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let Some(username) = params
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
    else {
        return failure(StatusCode::BAD_REQUEST, "username is required");
    };

    // The admin principal is refused for every caller, admin or not.
    if username == ADMIN_USERNAME {
        let err = StoreError::Protected(username);
        return failure(store_status(&err), err.to_string());
    }
    if let Some(denied) = forbidden(&session) {
        return denied;
    }

    match state.store.remove(&username).await {
        Ok(()) => {
            info!(subject = %session.subject, username = %username, "user removed");
            list_response(&state, StatusCode::OK).await
        }
        Err(err) => failure(store_status(&err), err.to_string()),
    }
}
