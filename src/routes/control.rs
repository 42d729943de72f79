//! Control-plane endpoints under `/tunnel-control`.
//!
//! Every response is `200 OK`. Failures are reported in the body as
//! `{"ok": false, "msg": ...}` with a fixed, detail-free message; the full
//! error only goes to the log.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::util::token_fingerprint;
use crate::AppState;

fn failure(token: &str, err: &GatewayError) -> Json<Value> {
    debug!(token = %token_fingerprint(token), "Control request failed: {err}");
    Json(json!({"ok": false, "msg": err.public_message()}))
}

/// `GET /tunnel-control/live`
pub async fn live(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"live": true, "time": state.control.live()}))
}

/// `GET /tunnel-control/session-status/{token}`
pub async fn session_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Json<Value> {
    match state.control.session_status(&token) {
        Ok(status) => Json(json!({
            "ok": true,
            "hasTunnel": status.has_tunnel,
            "hadTunnel": status.had_tunnel,
        })),
        Err(e) => failure(&token, &e),
    }
}

/// `GET /tunnel-control/invalidate-session/{token}`
///
/// Closing transports may block, so the work runs on the blocking pool.
/// Individual close failures are logged by the session and still yield
/// `ok: true`: the session is gone either way.
pub async fn invalidate_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Json<Value> {
    let control = state.control.clone();
    let task_token = token.clone();
    let result =
        tokio::task::spawn_blocking(move || control.invalidate_session(&task_token)).await;

    match result {
        Ok(Ok(_)) => Json(json!({"ok": true})),
        Ok(Err(e)) => failure(&token, &e),
        Err(e) => {
            warn!(token = %token_fingerprint(&token), "Invalidation task failed: {e}");
            Json(json!({"ok": false, "msg": "Internal error"}))
        }
    }
}

/// `GET /tunnel-control/session-tunnel/{token}`
pub async fn session_tunnel(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Json<Value> {
    match state.control.session_tunnel(&token) {
        Ok(id) => Json(json!({"ok": true, "tunnelId": id.to_string()})),
        Err(e) => failure(&token, &e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::routes::router;
    use crate::routes::test_support::{authed, get, send, state};
    use crate::sessions::Session;
    use crate::transport::mock::MockTransport;
    use crate::tunnel::{SimpleTunnel, Tunnel};
    use crate::AppState;

    fn with_session(state: &AppState, token: &str, tunnels: usize) -> Vec<Arc<dyn Tunnel>> {
        let session = Arc::new(Session::new("alice"));
        let mut added = Vec::new();
        for _ in 0..tunnels {
            let t: Arc<dyn Tunnel> = Arc::new(SimpleTunnel::new(Box::new(MockTransport::new())));
            session.add_tunnel(Arc::clone(&t)).unwrap();
            added.push(t);
        }
        state.registry.put(token.to_string(), session);
        added
    }

    #[tokio::test]
    async fn test_live() {
        let (status, body) = send(router(state()), get("/tunnel-control/live")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["live"], true);
        assert!(body["time"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_unknown_token_is_ok_false() {
        let app = router(state());
        for path in [
            "/tunnel-control/session-status/abc",
            "/tunnel-control/invalidate-session/abc",
            "/tunnel-control/session-tunnel/abc",
        ] {
            let (status, body) = send(app.clone(), get(path)).await;
            assert_eq!(status, StatusCode::OK, "{path}");
            assert_eq!(body["ok"], false, "{path}");
            assert_eq!(body["msg"], "No such session", "{path}");
        }
    }

    #[tokio::test]
    async fn test_status_with_one_tunnel() {
        let state = state();
        with_session(&state, "T1", 1);
        let (_, body) = send(router(state), get("/tunnel-control/session-status/T1")).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["hasTunnel"], true);
        assert_eq!(body["hadTunnel"], true);
    }

    #[tokio::test]
    async fn test_invalidate_then_status() {
        let state = state();
        let tunnels = with_session(&state, "T1", 2);
        let app = router(state.clone());

        let (_, body) = send(app.clone(), get("/tunnel-control/invalidate-session/T1")).await;
        assert_eq!(body, serde_json::json!({"ok": true}));
        assert!(tunnels.iter().all(|t| !t.is_open()));
        assert!(state.registry.is_empty());

        let (_, body) = send(app, get("/tunnel-control/session-status/T1")).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_invalidate_with_failing_close_still_ok() {
        let state = state();
        let session = Arc::new(Session::new("bob"));
        let t: Arc<dyn Tunnel> =
            Arc::new(SimpleTunnel::new(Box::new(MockTransport::failing_close())));
        session.add_tunnel(t).unwrap();
        state.registry.put("T2".into(), Arc::clone(&session));

        let (_, body) = send(router(state), get("/tunnel-control/invalidate-session/T2")).await;
        assert_eq!(body["ok"], true);
        assert!(session.is_terminated());
    }

    #[tokio::test]
    async fn test_session_tunnel() {
        let state = state();
        with_session(&state, "EMPTY", 0);
        let tunnels = with_session(&state, "ONE", 1);
        let app = router(state);

        let (_, body) = send(app.clone(), get("/tunnel-control/session-tunnel/EMPTY")).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["msg"], "No such tunnel");

        let (_, body) = send(app, get("/tunnel-control/session-tunnel/ONE")).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["tunnelId"], tunnels[0].id().to_string());
    }

    #[tokio::test]
    async fn test_protect_control_requires_key() {
        let mut config = crate::config::Config::default();
        config.auth.api_key = crate::routes::test_support::API_KEY.to_string();
        config.auth.protect_control = true;
        let app = router(AppState::new(config));

        let (status, _) = send(app.clone(), get("/tunnel-control/live")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(app, authed("GET", "/tunnel-control/live", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["live"], true);
    }
}
