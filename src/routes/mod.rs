//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group:
//!
//! | Group       | Auth                                   |
//! |-------------|----------------------------------------|
//! | [`health`]  | none                                   |
//! | [`control`] | none, or API key with `protect_control` |
//! | [`tokens`]  | API key                                |
//! | [`transfers`] | API key                              |
//! | [`tunnels`] | session token                          |

pub mod control;
pub mod health;
pub mod tokens;
pub mod transfers;
pub mod tunnels;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::auth::{self, ApiKey};
use crate::error::{ErrorKind, GatewayError};
use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/api/health", get(health::health));

    let mut control_routes = Router::new()
        .route("/tunnel-control/live", get(control::live))
        .route(
            "/tunnel-control/session-status/{token}",
            get(control::session_status),
        )
        .route(
            "/tunnel-control/invalidate-session/{token}",
            get(control::invalidate_session),
        )
        .route(
            "/tunnel-control/session-tunnel/{token}",
            get(control::session_tunnel),
        );
    if state.config.auth.protect_control {
        control_routes = control_routes.layer(middleware::from_fn(auth::require_api_key));
    }

    let authed_routes = Router::new()
        .route("/api/tokens", post(tokens::create_token))
        .route("/api/tokens/{token}", delete(tokens::delete_token))
        .route("/api/transfers", get(transfers::get_transfers))
        .layer(middleware::from_fn(auth::require_api_key));

    let session_routes = Router::new()
        .route("/api/session/tunnels", get(tunnels::list_tunnels))
        .route("/api/session/tunnels/{id}/protocol", get(tunnels::protocol))
        .route(
            "/api/session/tunnels/{id}/active-connection",
            get(tunnels::active_connection),
        )
        .route(
            "/api/session/tunnels/{id}/streams/{index}/{filename}",
            get(tunnels::stream),
        );

    Router::new()
        .merge(public_routes)
        .merge(control_routes)
        .merge(authed_routes)
        .merge(session_routes)
        .layer(Extension(ApiKey(state.config.auth.api_key.clone())))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a core error onto the `{"error": ...}` response shape.
pub(crate) fn error_response(err: &GatewayError) -> (StatusCode, Json<Value>) {
    let status = match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::ConcurrencyAbort => StatusCode::CONFLICT,
        ErrorKind::TransportFailure => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({"error": err.public_message()})))
}

pub(crate) fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal error"})),
    )
}
