//! Per-tunnel resources of the caller's own session.
//!
//! Every handler authenticates with the session token (`X-Gateway-Token`
//! header or `?token=`) and counts as session activity for expiry.
//!
//! | Method | Path                                                    |
//! |--------|---------------------------------------------------------|
//! | GET    | `/api/session/tunnels`                                  |
//! | GET    | `/api/session/tunnels/{id}/protocol`                    |
//! | GET    | `/api/session/tunnels/{id}/active-connection`           |
//! | GET    | `/api/session/tunnels/{id}/streams/{index}/{filename}`  |

use std::sync::Arc;

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{error_response, internal_error};
use crate::audit::TransferRecord;
use crate::auth::session_token;
use crate::error::{GatewayError, Resource};
use crate::protocols::ProtocolInfo;
use crate::sessions::Session;
use crate::tunnel::{AuditedTunnel, Tunnel};
use crate::util::epoch_millis;
use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Deserialize, Default)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct StreamQuery {
    pub token: Option<String>,
    /// Media type the client expects the stream to carry.
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

/// What is running over one tunnel, from the session owner's point of view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConnection {
    pub identifier: Uuid,
    pub connection_identifier: Option<String>,
    pub protocol: Option<String>,
    pub username: String,
    /// Epoch milliseconds.
    pub start_date: u64,
    pub remote_host: Option<String>,
    pub request_type: String,
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> ApiResult<Arc<Session>> {
    let Some(token) = session_token(headers, query_token) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing session token"})),
        ));
    };
    let session = state.registry.get(&token).map_err(|_| {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Invalid session token"})),
        )
    })?;
    session.touch();
    Ok(session)
}

fn lookup(session: &Session, id: &Uuid) -> ApiResult<Arc<dyn Tunnel>> {
    session.tunnel(id).map_err(|e| error_response(&e))
}

/// `GET /api/session/tunnels`: ids of the caller's tunnels.
pub async fn list_tunnels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<Value>> {
    let session = authenticate(&state, &headers, query.token.as_deref())?;
    let mut ids: Vec<String> = session.tunnels().keys().map(Uuid::to_string).collect();
    ids.sort();
    Ok(Json(json!({ "tunnels": ids })))
}

/// `GET /api/session/tunnels/{id}/protocol`
///
/// A protocol the catalog has never heard of still yields a descriptor
/// carrying just its name.
pub async fn protocol(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<ProtocolInfo>> {
    let session = authenticate(&state, &headers, query.token.as_deref())?;
    let tunnel = lookup(&session, &id)?;
    let Some(name) = tunnel.transport().protocol() else {
        return Err(error_response(&GatewayError::not_found(
            Resource::Protocol,
            id.to_string(),
        )));
    };
    let info = state
        .protocols
        .protocol(name)
        .unwrap_or_else(|| ProtocolInfo::bare(name));
    Ok(Json(info))
}

/// `GET /api/session/tunnels/{id}/active-connection`
pub async fn active_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<ActiveConnection>> {
    let session = authenticate(&state, &headers, query.token.as_deref())?;
    let tunnel = lookup(&session, &id)?;
    let configuration = tunnel.connection_configuration();

    Ok(Json(ActiveConnection {
        identifier: tunnel.id(),
        connection_identifier: configuration.as_ref().and_then(|c| c.connection_id.clone()),
        protocol: configuration
            .map(|c| c.protocol)
            .or_else(|| tunnel.transport().protocol().map(ToString::to_string)),
        username: session.username().to_string(),
        start_date: epoch_millis(tunnel.created_at()),
        remote_host: tunnel.client_info().and_then(|c| c.remote_host),
        request_type: tunnel.request_type_name(),
    }))
}

/// `GET /api/session/tunnels/{id}/streams/{index}/{filename}?type=<mime>`
///
/// Always records a transfer event, even when the capture then fails or no
/// interceptor is installed (`501`).
pub async fn stream(
    State(state): State<AppState>,
    Path((id, index, filename)): Path<(Uuid, u32, String)>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let session = authenticate(&state, &headers, query.token.as_deref())?;
    let tunnel = lookup(&session, &id)?;
    let media_type = query
        .media_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());

    let event_id = state
        .transfer_log
        .record(TransferRecord {
            url: uri.to_string(),
            method: "GET".to_string(),
            tunnel_id: id,
            stream_index: index,
            filename: filename.clone(),
            media_type: media_type.clone(),
            content_length: headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
            username: session.username().to_string(),
        })
        .await;
    info!(event_id, tunnel_id = %id, index, %filename, user = %session.username(), "Stream requested");

    let Some(interceptor) = state.interceptor.clone() else {
        return Err((
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({"error": "Stream interception is not available"})),
        ));
    };

    let requested = media_type.clone();
    let result = tokio::task::spawn_blocking(move || {
        let audited = AuditedTunnel::new(tunnel, "stream-intercept");
        interceptor.intercept(&audited, index, &requested)
    })
    .await;

    let captured = match result {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!(tunnel_id = %id, index, "Stream interception failed: {e}");
            return Err(error_response(&e));
        }
        Err(e) => {
            warn!(tunnel_id = %id, index, "Stream interception task failed: {e}");
            return Err(internal_error());
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, captured.media_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        captured.data,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::error::{GatewayError, Result};
    use crate::routes::router;
    use crate::routes::test_support::{get, send, state};
    use crate::sessions::Session;
    use crate::streams::{InterceptedStream, StreamInterceptor};
    use crate::transport::mock::MockTransport;
    use crate::tunnel::{ClientInfo, ConnectionConfiguration, SimpleTunnel, Tunnel};
    use crate::AppState;

    struct EchoInterceptor;

    impl StreamInterceptor for EchoInterceptor {
        fn intercept(
            &self,
            tunnel: &dyn Tunnel,
            index: u32,
            media_type: &str,
        ) -> Result<InterceptedStream> {
            if index == 99 {
                return Err(GatewayError::TransportFailure("stream vanished".into()));
            }
            Ok(InterceptedStream {
                media_type: media_type.to_string(),
                data: format!("{}:{index}", tunnel.id()).into_bytes(),
            })
        }
    }

    fn setup(state: &AppState, protocol: Option<&str>) -> Arc<dyn Tunnel> {
        let session = Arc::new(Session::new("alice"));
        let t: Arc<dyn Tunnel> = Arc::new(SimpleTunnel::new(Box::new(
            MockTransport::new().with_protocol(protocol),
        )));
        session.add_tunnel(Arc::clone(&t)).unwrap();
        state.registry.put("TOK".into(), session);
        t
    }

    #[tokio::test]
    async fn test_token_required() {
        let state = state();
        setup(&state, Some("vnc"));
        let app = router(state);

        let (status, _) = send(app.clone(), get("/api/session/tunnels")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app, get("/api/session/tunnels?token=nope")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_via_header() {
        let state = state();
        let t = setup(&state, Some("vnc"));
        let request = Request::builder()
            .uri("/api/session/tunnels")
            .header("x-gateway-token", "TOK")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(state), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tunnels"], serde_json::json!([t.id().to_string()]));
    }

    #[tokio::test]
    async fn test_protocol_lookup() {
        let state = state();
        let t = setup(&state, Some("vnc"));
        let uri = format!("/api/session/tunnels/{}/protocol?token=TOK", t.id());
        let (status, body) = send(router(state), get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "vnc");
        assert!(!body["parameters"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_bare() {
        let state = state();
        let t = setup(&state, Some("gopher"));
        let uri = format!("/api/session/tunnels/{}/protocol?token=TOK", t.id());
        let (status, body) = send(router(state), get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "gopher");
        assert_eq!(body["parameters"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_protocol_is_404() {
        let state = state();
        let t = setup(&state, None);
        let uri = format!("/api/session/tunnels/{}/protocol?token=TOK", t.id());
        let (status, body) = send(router(state), get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Protocol not known");
    }

    #[tokio::test]
    async fn test_unknown_tunnel_is_404() {
        let state = state();
        setup(&state, Some("vnc"));
        let uri = format!(
            "/api/session/tunnels/{}/active-connection?token=TOK",
            uuid::Uuid::new_v4()
        );
        let (status, body) = send(router(state), get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No such tunnel");
    }

    #[tokio::test]
    async fn test_active_connection() {
        let state = state();
        let t = setup(&state, Some("vnc"));
        t.set_request_type_name("connection".into());
        t.set_connection_configuration(ConnectionConfiguration {
            connection_id: Some("42".into()),
            protocol: "rdp".into(),
            parameters: Default::default(),
        });
        t.set_client_info(ClientInfo {
            remote_host: Some("10.0.0.7".into()),
            ..Default::default()
        });

        let uri = format!("/api/session/tunnels/{}/active-connection?token=TOK", t.id());
        let (status, body) = send(router(state), get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identifier"], t.id().to_string());
        assert_eq!(body["connectionIdentifier"], "42");
        assert_eq!(body["protocol"], "rdp");
        assert_eq!(body["username"], "alice");
        assert_eq!(body["remoteHost"], "10.0.0.7");
        assert_eq!(body["requestType"], "connection");
        assert!(body["startDate"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_stream_without_interceptor_is_recorded() {
        let state = state();
        let t = setup(&state, Some("rdp"));
        let uri = format!(
            "/api/session/tunnels/{}/streams/3/report.pdf?token=TOK&type=application/pdf",
            t.id()
        );
        let (status, _) = send(router(state.clone()), get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        let events = state.transfer_log.read_since(0, 10).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tunnel_id, t.id());
        assert_eq!(events[0].stream_index, 3);
        assert_eq!(events[0].filename, "report.pdf");
        assert_eq!(events[0].media_type, "application/pdf");
        assert_eq!(events[0].username, "alice");
    }

    #[tokio::test]
    async fn test_stream_with_interceptor() {
        let state = state().with_interceptor(Arc::new(EchoInterceptor));
        let t = setup(&state, Some("rdp"));
        let uri = format!(
            "/api/session/tunnels/{}/streams/5/a.txt?token=TOK&type=text/plain",
            t.id()
        );

        let response = router(state.clone()).oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"a.txt\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, format!("{}:5", t.id()).as_bytes());
        assert_eq!(state.transfer_log.len().await, 1);
    }

    #[tokio::test]
    async fn test_stream_failure_maps_to_bad_gateway() {
        let state = state().with_interceptor(Arc::new(EchoInterceptor));
        let t = setup(&state, Some("rdp"));
        let uri = format!("/api/session/tunnels/{}/streams/99/x.bin?token=TOK", t.id());
        let (status, body) = send(router(state.clone()), get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Backend connection error");
        assert_eq!(state.transfer_log.len().await, 1);
    }
}
