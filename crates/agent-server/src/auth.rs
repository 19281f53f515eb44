//! Cognito hosted-UI login.
//!
//! Authorization-code flow: `/auth/login` redirects to the hosted UI with a
//! random `state` kept in a cookie, `/auth/callback` exchanges the code for
//! tokens and verifies the ID token against the user pool JWKS, and the
//! resulting user is kept server-side under a random cookie token.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};

use agent_gateway::GatewayError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::env_or;
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "strands_session";
pub const STATE_COOKIE: &str = "oauth_state";

/// Lifetime of a login
pub const LOGIN_TTL: Duration = Duration::from_secs(3600);

/// Minimum gap between JWKS fetches triggered by unknown `kid`s
const JWKS_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth configuration error: {0}")]
    Config(String),

    /// `error` returned by the hosted UI on the callback
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Invalid ID token: {0}")]
    InvalidToken(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("Authentication error: {msg}"),
            Self::StateMismatch => "Authentication error: the login request expired. Please try again.".into(),
            Self::Config(_) => "Authentication is not configured on this server.".into(),
            _ => "Authentication error: could not verify your login.".into(),
        }
    }
}

type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Clone, Debug)]
pub struct CognitoConfig {
    /// Hosted UI domain, without scheme
    pub domain: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub logout_uri: String,
    pub region: String,
    pub user_pool_id: String,
}

impl CognitoConfig {
    pub fn from_env() -> AuthResult<Self> {
        let required = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::Config(format!("{key} not set")))
        };

        Ok(Self {
            domain: required("COGNITO_DOMAIN")?,
            client_id: required("COGNITO_CLIENT_ID")?,
            client_secret: std::env::var("COGNITO_CLIENT_SECRET").ok().filter(|s| !s.is_empty()),
            redirect_uri: env_or("COGNITO_REDIRECT_URI", "http://localhost:5001/auth/callback".into()),
            logout_uri: env_or("COGNITO_LOGOUT_URI", "http://localhost:5001/logout".into()),
            region: env_or("AWS_REGION", "us-west-2".into()),
            user_pool_id: required("COGNITO_USER_POOL_ID")?,
        })
    }

    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("https://{}/{path}", self.domain)
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub token_use: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub id_token: String,
}

impl AuthenticatedUser {
    fn from_claims(claims: IdClaims, tokens: TokenResponse) -> Self {
        let email = claims.email.unwrap_or_default();
        Self {
            id: claims.sub,
            name: claims.name.unwrap_or_else(|| email.clone()),
            email,
            access_token: tokens.access_token,
            id_token: tokens.id_token,
        }
    }
}

/// Verifies RS256 ID tokens against the user pool's published keys.
///
/// Keys are cached and refetched when a token names an unknown `kid`, at
/// most once per [`JWKS_REFRESH_COOLDOWN`].
pub struct IdTokenVerifier {
    http: reqwest::Client,
    jwks_url: String,
    validation: Validation,
    keys: RwLock<JwkSet>,
    last_refresh: Mutex<Option<Instant>>,
}

impl IdTokenVerifier {
    pub fn new(config: &CognitoConfig, http: reqwest::Client) -> Self {
        Self::with_keys(config, http, JwkSet { keys: Vec::new() })
    }

    pub fn with_keys(config: &CognitoConfig, http: reqwest::Client, keys: JwkSet) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&config.client_id]);
        validation.set_issuer(&[config.issuer()]);

        Self {
            http,
            jwks_url: config.jwks_url(),
            validation,
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(None),
        }
    }

    pub async fn verify(&self, token: &str) -> AuthResult<IdClaims> {
        let kid = decode_header(token)?
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".into()))?;

        let key = match self.key(&kid).await? {
            Some(key) => key,
            None => {
                self.refresh().await?;
                self.key(&kid)
                    .await?
                    .ok_or_else(|| AuthError::InvalidToken(format!("unknown signing key {kid}")))?
            }
        };

        let claims = decode::<IdClaims>(token, &key, &self.validation)?.claims;
        if claims.token_use != "id" {
            return Err(AuthError::InvalidToken(format!(
                "expected an id token, got token_use={}",
                claims.token_use
            )));
        }
        Ok(claims)
    }

    async fn key(&self, kid: &str) -> AuthResult<Option<DecodingKey>> {
        self.keys
            .read()
            .await
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(AuthError::from)
    }

    async fn refresh(&self) -> AuthResult<()> {
        let mut last = self.last_refresh.lock().await;
        if last.is_some_and(|at| at.elapsed() < JWKS_REFRESH_COOLDOWN) {
            tracing::debug!("JWKS refreshed recently, not refetching");
            return Ok(());
        }
        *last = Some(Instant::now());

        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");
        let keys: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        *self.keys.write().await = keys;
        Ok(())
    }
}

/// Logged-in users keyed by the session cookie token
#[derive(Default)]
pub struct LoginStore {
    logins: RwLock<HashMap<String, (AuthenticatedUser, Instant)>>,
}

impl LoginStore {
    pub async fn insert(&self, user: AuthenticatedUser) -> String {
        let token = hex::encode(rand::thread_rng().r#gen::<[u8; 32]>());
        self.logins
            .write()
            .await
            .insert(token.clone(), (user, Instant::now() + LOGIN_TTL));
        token
    }

    pub async fn get(&self, token: &str) -> Option<AuthenticatedUser> {
        let logins = self.logins.read().await;
        let (user, expires) = logins.get(token)?;
        (Instant::now() < *expires).then(|| user.clone())
    }

    pub async fn remove(&self, token: &str) {
        self.logins.write().await.remove(token);
    }

    /// Drop expired logins, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut logins = self.logins.write().await;
        let before = logins.len();
        logins.retain(|_, (_, expires)| now < *expires);
        before - logins.len()
    }
}

pub struct AuthService {
    config: CognitoConfig,
    http: reqwest::Client,
    verifier: IdTokenVerifier,
    logins: LoginStore,
}

impl AuthService {
    pub fn new(config: CognitoConfig, http: reqwest::Client, verifier: IdTokenVerifier) -> Self {
        Self {
            config,
            http,
            verifier,
            logins: LoginStore::default(),
        }
    }

    pub fn from_env() -> AuthResult<Self> {
        let config = CognitoConfig::from_env()?;
        let http = reqwest::Client::new();
        let verifier = IdTokenVerifier::new(&config, http.clone());
        Ok(Self::new(config, http, verifier))
    }

    pub const fn logins(&self) -> &LoginStore {
        &self.logins
    }

    fn secure_cookies(&self) -> bool {
        self.config.redirect_uri.starts_with("https://")
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies())
            .into()
    }

    /// Hosted UI authorize URL plus the jar carrying the matching `state`.
    pub fn begin_login(&self, jar: CookieJar) -> AuthResult<(CookieJar, String)> {
        let state = hex::encode(rand::thread_rng().r#gen::<[u8; 16]>());
        let url = Url::parse_with_params(
            &self.config.endpoint("oauth2/authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("scope", "email openid"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AuthError::Config(format!("COGNITO_DOMAIN: {e}")))?;

        Ok((jar.add(self.cookie(STATE_COOKIE, state)), url.into()))
    }

    pub fn logout_url(&self) -> AuthResult<String> {
        Url::parse_with_params(
            &self.config.endpoint("logout"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("logout_uri", self.config.logout_uri.as_str()),
            ],
        )
        .map(Into::into)
        .map_err(|e| AuthError::Config(format!("COGNITO_DOMAIN: {e}")))
    }

    pub async fn exchange_code(&self, code: &str) -> AuthResult<TokenResponse> {
        let mut request = self.http.post(self.config.endpoint("oauth2/token")).form(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ]);
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let body: serde_json::Value = request.send().await?.json().await?;
        if let Some(error) = body.get("error") {
            return Err(AuthError::TokenExchange(error.to_string()));
        }
        serde_json::from_value(body).map_err(|e| AuthError::TokenExchange(e.to_string()))
    }

    /// Check `state`, redeem `code`, verify the ID token and start a login.
    pub async fn complete_login(
        &self,
        jar: CookieJar,
        code: &str,
        state: &str,
    ) -> AuthResult<(CookieJar, AuthenticatedUser)> {
        if jar.get(STATE_COOKIE).is_none_or(|c| c.value() != state) {
            return Err(AuthError::StateMismatch);
        }

        let tokens = self.exchange_code(code).await?;
        let claims = self.verifier.verify(&tokens.id_token).await?;
        let user = AuthenticatedUser::from_claims(claims, tokens);

        let token = self.logins.insert(user.clone()).await;
        tracing::info!(user = %user.id, email = %user.email, "User logged in");

        let jar = jar
            .remove(Cookie::build(STATE_COOKIE).path("/"))
            .add(self.cookie(SESSION_COOKIE, token));
        Ok((jar, user))
    }

    pub async fn user_from_jar(&self, jar: &CookieJar) -> Option<AuthenticatedUser> {
        self.logins.get(jar.get(SESSION_COOKIE)?.value()).await
    }

    /// Forget the login named by the jar and clear its cookie.
    pub async fn logout(&self, jar: CookieJar) -> CookieJar {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            self.logins.remove(cookie.value()).await;
        }
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }
}

/// Logged-in user for the JSON API; rejects with 401.
pub struct ApiUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for ApiUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        state
            .auth
            .user_from_jar(&jar)
            .await
            .map(Self)
            .ok_or(ApiError(GatewayError::AuthenticationRequired))
    }
}

/// Logged-in user for the HTML pages; redirects to the login flow.
pub struct WebUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for WebUser {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        state
            .auth
            .user_from_jar(&jar)
            .await
            .map(Self)
            .ok_or_else(|| Redirect::to("/auth/login"))
    }
}

pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(Self(state.auth.user_from_jar(&jar).await))
    }
}
