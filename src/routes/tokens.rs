//! Session issuing for an external authenticator.
//!
//! - `POST /api/tokens` `{"username": "alice"}` → `{"authToken", "username"}`
//! - `DELETE /api/tokens/{token}` → `204`, the session is invalidated

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{error_response, internal_error};
use crate::auth::generate_token;
use crate::sessions::Session;
use crate::util::token_fingerprint;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub username: String,
}

/// `POST /api/tokens`: create a session for an already-authenticated principal.
pub async fn create_token(
    State(state): State<AppState>,
    Json(req): Json<CreateTokenRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "username must not be empty"})),
        ));
    }

    let token = generate_token();
    let session = Arc::new(Session::new(username));
    if let Some(previous) = state.registry.put(token.clone(), session) {
        // Only reachable on a token collision.
        warn!(token = %token_fingerprint(&token), "Replaced an existing session");
        invalidate_replaced(previous, token_fingerprint(&token)).await;
    }
    info!(user = %username, token = %token_fingerprint(&token), "Session issued");

    Ok(Json(json!({"authToken": token, "username": username})))
}

/// Invalidate a session that lost its token to a newer one.
async fn invalidate_replaced(previous: Arc<Session>, fingerprint: String) -> bool {
    match tokio::task::spawn_blocking(move || previous.invalidate()).await {
        Ok(report) => {
            debug!(token = %fingerprint, closed = report.closed.len(), "Replaced session invalidated");
            true
        }
        Err(e) => {
            warn!(token = %fingerprint, "Invalidating replaced session failed: {e}");
            false
        }
    }
}

/// `DELETE /api/tokens/{token}`: log a session out.
pub async fn delete_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let registry = Arc::clone(&state.registry);
    let result =
        tokio::task::spawn_blocking(move || registry.remove(&token).map(|s| s.invalidate()))
            .await;

    match result {
        Ok(Ok(_)) => Ok(StatusCode::NO_CONTENT),
        Ok(Err(e)) => Err(error_response(&e)),
        Err(e) => {
            warn!("Logout task failed: {e}");
            Err(internal_error())
        }
    }
}
