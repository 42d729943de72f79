//! File-transfer audit endpoint.
//!
//! `GET /api/transfers?since_id=N&limit=N`: returns recorded stream
//! interceptions, oldest first.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::AppState;

/// Query parameters for `GET /api/transfers`.
#[derive(Deserialize)]
pub struct TransfersQuery {
    /// Return entries with `id > since_id`. Defaults to 0 (all entries).
    #[serde(default)]
    pub since_id: u64,
    /// Maximum number of entries to return. Defaults to 50, max 200.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// `GET /api/transfers`: read recent transfer events.
pub async fn get_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransfersQuery>,
) -> Json<Value> {
    let limit = query.limit.min(200);
    let entries = state.transfer_log.read_since(query.since_id, limit).await;
    Json(json!({ "entries": entries }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use uuid::Uuid;

    use crate::audit::TransferRecord;
    use crate::routes::router;
    use crate::routes::test_support::{authed, get, send, state};

    fn record(name: &str) -> TransferRecord {
        TransferRecord {
            url: format!("/x/{name}"),
            method: "GET".into(),
            tunnel_id: Uuid::nil(),
            stream_index: 0,
            filename: name.into(),
            media_type: "text/plain".into(),
            content_length: None,
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn test_requires_api_key() {
        let (status, _) = send(router(state()), get("/api/transfers")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_since_id_filter() {
        let state = state();
        let first = state.transfer_log.record(record("a")).await;
        state.transfer_log.record(record("b")).await;

        let uri = format!("/api/transfers?since_id={first}");
        let (status, body) = send(router(state), authed("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["filename"], "b");
    }
}
