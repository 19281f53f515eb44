//! Browser-facing routes: Cognito login and the HTML forms.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use agent_core::{NewSession, SessionId};
use agent_gateway::{ModelCatalog, ServerEntry};

use crate::auth::{MaybeUser, WebUser};
use crate::error::WebError;
use crate::state::AppState;
use crate::views;

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Result<Response, WebError> {
    let (jar, url) = state.auth.begin_login(jar).map_err(|e| {
        tracing::error!(error = %e, "Cannot start login");
        WebError::new(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
    })?;
    Ok((jar, Redirect::to(&url)).into_response())
}

pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, WebError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_else(|| error.clone());
        tracing::error!(error = %error, description = %description, "Identity provider returned an error");
        return Err(WebError::new(
            StatusCode::UNAUTHORIZED,
            format!("Authentication error: {description}"),
        ));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(WebError::new(
            StatusCode::BAD_REQUEST,
            "Authentication error: missing authorization code",
        ));
    };

    let (jar, _user) = state
        .auth
        .complete_login(jar, &code, &oauth_state)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Login failed");
            WebError::new(StatusCode::UNAUTHORIZED, e.user_message())
        })?;

    Ok((jar, Redirect::to("/")).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = state.auth.logout(jar).await;
    match state.auth.logout_url() {
        Ok(url) => (jar, Redirect::to(&url)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "No hosted logout, showing local page");
            (jar, Redirect::to("/logout")).into_response()
        }
    }
}

pub async fn logged_out() -> Html<String> {
    views::login_page(Some("You have been logged out successfully."))
}

// ============================================================================
// Pages
// ============================================================================

pub async fn home(MaybeUser(user): MaybeUser) -> Html<String> {
    match user {
        Some(user) => views::index_page(&user),
        None => views::login_page(None),
    }
}

pub async fn connect_form(State(state): State<AppState>, WebUser(user): WebUser) -> Html<String> {
    let mut servers = state.registry.list().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring server registry");
        BTreeMap::new()
    });
    if servers.is_empty() {
        servers.insert(
            "Default MCP Server".into(),
            ServerEntry::new(state.default_server.clone()),
        );
    }

    let catalog = ModelCatalog::load_or_default(&state.model_file).await;
    views::connect_page(&user, &servers, &catalog, &state.default_server)
}

#[derive(Debug, Deserialize)]
pub struct ConnectForm {
    pub server_url: String,
    pub region: String,
    pub model_id: String,
}

pub async fn connect(
    State(state): State<AppState>,
    WebUser(user): WebUser,
    Form(form): Form<ConnectForm>,
) -> Result<Html<String>, WebError> {
    let session_id = state
        .queries
        .connect(NewSession {
            endpoint: form.server_url,
            region: form.region,
            model_id: form.model_id,
            auth_token: Some(user.access_token.clone()),
        })
        .await?;

    let session = state.queries.session(&session_id).await?;
    Ok(views::chat_page(&user, &session))
}

#[derive(Debug, Deserialize)]
pub struct QueryForm {
    pub session_id: SessionId,
    pub query: String,
}

pub async fn query(
    State(state): State<AppState>,
    WebUser(user): WebUser,
    Form(form): Form<QueryForm>,
) -> Result<Html<String>, WebError> {
    state.queries.query(&form.session_id, &form.query).await?;
    let session = state.queries.session(&form.session_id).await?;
    Ok(views::response_page(&user, &session))
}

pub async fn add_server_form(WebUser(user): WebUser) -> Html<String> {
    views::add_server_page(&user)
}

#[derive(Debug, Deserialize)]
pub struct AddServerForm {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Serialize)]
pub struct AddServerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn add_server(
    State(state): State<AppState>,
    WebUser(_user): WebUser,
    Form(form): Form<AddServerForm>,
) -> Json<AddServerResponse> {
    let name = form.server_name.trim();
    if name.is_empty() || form.server_url.trim().is_empty() {
        return Json(AddServerResponse {
            success: false,
            message: None,
            error: Some("Server name and URL are required".into()),
        });
    }

    let defaults = ServerEntry::new(form.server_url.trim());
    let entry = ServerEntry {
        command: form.command.filter(|c| !c.is_empty()).unwrap_or_else(|| defaults.command.clone()),
        transport: form.transport.filter(|t| !t.is_empty()).unwrap_or_else(|| defaults.transport.clone()),
        allow_http: form.allow_http,
        ..defaults
    };

    match state.registry.add(name, entry).await {
        Ok(()) => Json(AddServerResponse {
            success: true,
            message: Some(format!("Server '{name}' added successfully")),
            error: None,
        }),
        Err(e) => {
            tracing::error!(error = %e, "Error adding server");
            Json(AddServerResponse {
                success: false,
                message: None,
                error: Some(format!("Error: {e}")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DOWN, login, test_state};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        cookie: Option<header::HeaderValue>,
        form: Option<&str>,
    ) -> (StatusCode, header::HeaderMap, String) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                request = request.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let response = crate::app(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_home_shows_login_when_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, _, html) = send(&state, "GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"href="/auth/login""#));

        let cookie = login(&state).await;
        let (_, _, html) = send(&state, "GET", "/", Some(cookie), None).await;
        assert!(html.contains("Welcome, Ada"));
    }

    #[tokio::test]
    async fn test_forms_redirect_to_login() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, headers, _) = send(&state, "GET", "/web/connect", None, None).await;
        assert!(status.is_redirection());
        assert_eq!(headers[header::LOCATION], "/auth/login");
    }

    #[tokio::test]
    async fn test_login_redirects_to_hosted_ui() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, headers, _) = send(&state, "GET", "/auth/login", None, None).await;
        assert!(status.is_redirection());
        let location = headers[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://auth.example.com/oauth2/authorize?"));
        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("oauth_state="));
    }

    #[tokio::test]
    async fn test_callback_error_renders_page() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, _, html) = send(
            &state,
            "GET",
            "/auth/callback?error=access_denied&error_description=denied%20by%20user",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(html.contains("Authentication error: denied by user"));
    }

    #[tokio::test]
    async fn test_logout_clears_login() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, headers, _) = send(&state, "GET", "/auth/logout", Some(cookie.clone()), None).await;
        assert!(status.is_redirection());
        assert!(headers[header::LOCATION].to_str().unwrap().starts_with("https://auth.example.com/logout"));

        let (status, _, _) = send(&state, "GET", "/web/connect", Some(cookie), None).await;
        assert!(status.is_redirection());
    }

    #[tokio::test]
    async fn test_connect_form_falls_back_to_default_server() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, _, html) = send(&state, "GET", "/web/connect", Some(cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Default MCP Server"));
        assert!(html.contains("Llama 3.2 (local)"));
    }

    #[tokio::test]
    async fn test_web_connect_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (status, _, html) = send(
            &state,
            "POST",
            "/web/connect",
            Some(cookie.clone()),
            Some("server_url=http%3A%2F%2Fe1%2Fsse&region=local&model_id=m1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"name="session_id""#));

        assert_eq!(state.queries.sessions().len().await, 1);
        let marker = r#"name="session_id" value=""#;
        let start = html.find(marker).unwrap() + marker.len();
        let id = &html[start..start + 36];

        let form = format!("session_id={id}&query=first");
        send(&state, "POST", "/web/query", Some(cookie.clone()), Some(&form)).await;
        let form = format!("session_id={id}&query=second");
        let (status, _, html) = send(&state, "POST", "/web/query", Some(cookie), Some(&form)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.find("m1: first").unwrap() < html.find("m1: second").unwrap());
    }

    #[tokio::test]
    async fn test_web_connect_failure_renders_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let form = format!("server_url={}&region=local&model_id=m1", DOWN.replace(':', "%3A").replace('/', "%2F"));
        let (status, _, html) = send(&state, "POST", "/web/connect", Some(cookie), Some(&form)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(html.contains("Could not connect"));
    }

    #[tokio::test]
    async fn test_add_server_writes_registry() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cookie = login(&state).await;

        let (_, _, body) = send(
            &state,
            "POST",
            "/web/add_server",
            Some(cookie.clone()),
            Some("server_name=pg&server_url=https%3A%2F%2Fpg%2Fsse&allow_http=true"),
        )
        .await;
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["success"], true);

        let servers = state.registry.list().await.unwrap();
        assert_eq!(servers["pg"].command, "npx");
        assert_eq!(servers["pg"].transport, "sse-only");
        assert!(servers["pg"].allow_http);

        let (_, _, body) = send(&state, "POST", "/web/add_server", Some(cookie), Some("server_name=x")).await;
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Server name and URL are required");
    }
}
