//! JSON API Handlers

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use agent_core::provider::DEFAULT_MODEL;
use agent_core::{NewSession, Session, SessionId};
use agent_gateway::GatewayError;

use crate::auth::ApiUser;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_REGION: &str = "us-west-2";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: SessionId,
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub session_id: SessionId,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Open a session bound to an MCP server, connecting to it first
pub async fn connect(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Json(payload): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let session_id = state
        .queries
        .connect(NewSession {
            endpoint: payload.server_url.unwrap_or_else(|| state.default_server.clone()),
            region: payload.region.unwrap_or_else(|| DEFAULT_REGION.into()),
            model_id: payload.model_id.unwrap_or_else(|| DEFAULT_MODEL.into()),
            auth_token: Some(user.access_token),
        })
        .await?;

    tracing::info!(session_id = %session_id, user = %user.id, "Session opened");
    Ok(Json(ConnectResponse {
        session_id,
        connected: true,
    }))
}

pub async fn query(
    State(state): State<AppState>,
    ApiUser(_user): ApiUser,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let response = state.queries.query(&payload.session_id, &payload.query).await?;
    Ok(Json(QueryResponse { response }))
}

pub async fn cleanup_session(
    State(state): State<AppState>,
    ApiUser(_user): ApiUser,
    Path(session_id): Path<SessionId>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.queries.cleanup(&session_id).await?;
    Ok(Json(MessageResponse {
        message: "Session cleaned up",
    }))
}

/// Parameters and history of a session opened by the caller
pub async fn get_session(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Session>, ApiError> {
    let session = state.queries.session(&session_id).await?;
    if session.auth_token.as_deref() != Some(user.access_token.as_str()) {
        return Err(GatewayError::SessionNotFound(session_id.to_string()).into());
    }
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DOWN, login, test_state};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        cookie: Option<header::HeaderValue>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = crate::app(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, body) = send(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_api_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, body) = send(&state, "POST", "/connect", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");

        let (status, _) = send(&state, "DELETE", "/session/abc", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_connect_query_history_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, body) = send(
            &state,
            "POST",
            "/connect",
            Some(cookie.clone()),
            Some(json!({"server_url": "http://e1/sse", "region": "local", "model_id": "m1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &state,
            "POST",
            "/query",
            Some(cookie.clone()),
            Some(json!({"session_id": session_id, "query": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "m1: hello");

        let uri = format!("/sessions/{session_id}");
        let (status, body) = send(&state, "GET", &uri, Some(cookie.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoint"], "http://e1/sse");
        assert_eq!(body["history"][0]["query"], "hello");
        assert!(body.get("auth_token").is_none());

        let uri = format!("/session/{session_id}");
        let (status, body) = send(&state, "DELETE", &uri, Some(cookie.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Session cleaned up");

        let (status, body) = send(&state, "DELETE", &uri, Some(cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_connect_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (_, body) = send(&state, "POST", "/connect", Some(cookie), Some(json!({}))).await;
        let id = SessionId::from_string(body["session_id"].as_str().unwrap());
        let session = state.queries.session(&id).await.unwrap();

        assert_eq!(session.endpoint, "http://localhost:8000/sse");
        assert_eq!(session.region, "us-west-2");
        assert_eq!(session.model_id, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, body) = send(
            &state,
            "POST",
            "/connect",
            Some(cookie),
            Some(json!({"server_url": DOWN})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "CONNECTION_ERROR");
        assert!(state.queries.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_query_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (_, body) = send(&state, "POST", "/connect", Some(cookie.clone()), Some(json!({}))).await;
        let session_id = body["session_id"].clone();

        let (status, body) = send(
            &state,
            "POST",
            "/query",
            Some(cookie),
            Some(json!({"session_id": session_id, "query": "please fail"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "QUERY_FAILED");
    }

    #[tokio::test]
    async fn test_unknown_session_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, _) = send(
            &state,
            "POST",
            "/query",
            Some(cookie),
            Some(json!({"session_id": "nope", "query": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_other_users_session_is_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let id = state
            .queries
            .sessions()
            .create(NewSession {
                endpoint: "http://e1/sse".into(),
                region: "local".into(),
                model_id: "m1".into(),
                auth_token: Some("someone-else".into()),
            })
            .await;

        let uri = format!("/sessions/{id}");
        let (status, _) = send(&state, "GET", &uri, Some(cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
