use async_trait::async_trait;
use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::Identity,
    repository::{ProfileLookupError, RepositoryState},
    session::{SessionState, SessionStore},
};

/// Cookie the SPA stores the Supabase access token in.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// AuthError
///
/// Failure taxonomy for everything that touches the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Bad credentials or an unusable token. Surfaced to the caller, never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The profile row is missing or unreachable.
    #[error("profile lookup failed: {0}")]
    ProfileLookup(#[from] ProfileLookupError),
    /// The auth service could not be reached or answered unexpectedly.
    #[error("auth service unreachable: {0}")]
    Network(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AuthError::ProfileLookup(_) | AuthError::Network(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// SignedInUser
///
/// What the auth collaborator knows about a user. The role lives in the profile row, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// AuthService
///
/// Contract for the external authentication collaborator. Each instance holds at most one
/// access token, so one instance represents one client's session.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedInUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// `Ok(None)` when there is no live session.
    async fn get_session(&self) -> Result<Option<SignedInUser>, AuthError>;

    /// The token held after a successful sign-in, if any.
    async fn access_token(&self) -> Option<String>;
}

pub type AuthServiceState = Arc<dyn AuthService>;

/// AuthConnector
///
/// Produces an [`AuthService`] bound to the access token a request arrived with.
pub trait AuthConnector: Send + Sync {
    fn connect(&self, access_token: Option<String>) -> AuthServiceState;
}

pub type AuthConnectorState = Arc<dyn AuthConnector>;

// --- Supabase Implementation ---

/// Claims
///
/// The subset of a Supabase access token payload this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: `auth.users.id`, which is also `public.profiles.id`.
    pub sub: Uuid,
    pub email: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: Uuid,
    email: Option<String>,
}

/// SupabaseAuthClient
///
/// Talks to Supabase GoTrue for sign-in and sign-out. Session checks never leave the process:
/// the held access token is validated locally against the project's JWT secret.
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    jwt_secret: String,
    access_token: RwLock<Option<String>>,
}

impl SupabaseAuthClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        anon_key: &str,
        jwt_secret: &str,
        access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            jwt_secret: jwt_secret.to_string(),
            access_token: RwLock::new(access_token),
        }
    }

    fn decode_token(&self, token: &str) -> Result<Option<Claims>, AuthError> {
        let key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;
        // GoTrue sets `aud: authenticated`; the signature is what matters here.
        validation.validate_aud = false;

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => Ok(Some(data.claims)),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Ok(None),
            Err(e) => Err(AuthError::Authentication(format!("invalid access token: {e}"))),
        }
    }
}

#[async_trait]
impl AuthService for SupabaseAuthClient {
    /// sign_in_with_password
    ///
    /// Password grant against `/auth/v1/token`. Any 4xx is treated as bad credentials.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedInUser, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::Authentication(
                "invalid login credentials".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AuthError::Network(format!("unexpected status {status}")));
        }

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        *self.access_token.write().await = Some(body.access_token);
        Ok(SignedInUser {
            id: body.user.id,
            email: body.user.email,
        })
    }

    /// sign_out
    ///
    /// Forgets the token locally first, then revokes it upstream.
    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(token) = self.access_token.write().await.take() else {
            return Ok(());
        };

        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::Network(format!(
                "sign-out returned {}",
                response.status()
            )))
        }
    }

    async fn get_session(&self) -> Result<Option<SignedInUser>, AuthError> {
        let Some(token) = self.access_token.read().await.clone() else {
            return Ok(None);
        };

        Ok(self.decode_token(&token)?.map(|claims| SignedInUser {
            id: claims.sub,
            email: claims.email,
        }))
    }

    async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }
}

/// SupabaseConnector
///
/// Shares one HTTP client across every per-request [`SupabaseAuthClient`].
#[derive(Clone)]
pub struct SupabaseConnector {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    jwt_secret: String,
}

impl SupabaseConnector {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
        }
    }
}

impl AuthConnector for SupabaseConnector {
    fn connect(&self, access_token: Option<String>) -> AuthServiceState {
        Arc::new(SupabaseAuthClient::new(
            self.http.clone(),
            &self.base_url,
            &self.anon_key,
            &self.jwt_secret,
            access_token,
        ))
    }
}

// --- Mock Implementation (For Tests) ---

/// MockAuthService
///
/// Scriptable stand-in for the auth collaborator. Counts calls so tests can assert on the
/// one-shot session check.
#[derive(Default)]
pub struct MockAuthService {
    session_user: Option<SignedInUser>,
    session_error: Option<AuthError>,
    session_delay: Option<Duration>,
    credentials: Option<(String, String, SignedInUser)>,
    sign_in_error: Option<AuthError>,
    sign_out_fails: bool,
    token: RwLock<Option<String>>,
    get_session_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MockAuthService {
    /// No live session, no accepted credentials.
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn with_session(user: SignedInUser) -> Self {
        Self {
            session_user: Some(user),
            ..Self::default()
        }
    }

    pub fn failing_session(error: AuthError) -> Self {
        Self {
            session_error: Some(error),
            ..Self::default()
        }
    }

    /// Accept exactly this email/password pair.
    pub fn accepting(mut self, email: &str, password: &str, user: SignedInUser) -> Self {
        self.credentials = Some((email.to_string(), password.to_string(), user));
        self
    }

    /// Fail every sign-in with this error instead of checking credentials.
    pub fn failing_sign_in(mut self, error: AuthError) -> Self {
        self.sign_in_error = Some(error);
        self
    }

    pub fn failing_sign_out(mut self) -> Self {
        self.sign_out_fails = true;
        self
    }

    /// Hold every `get_session` call open for `delay`.
    pub fn with_session_delay(mut self, delay: Duration) -> Self {
        self.session_delay = Some(delay);
        self
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedInUser, AuthError> {
        if let Some(error) = &self.sign_in_error {
            return Err(error.clone());
        }
        match &self.credentials {
            Some((e, p, user)) if e == email && p == password => {
                *self.token.write().await = Some(format!("mock-token-{}", user.id));
                Ok(user.clone())
            }
            _ => Err(AuthError::Authentication(
                "invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.token.write().await = None;
        if self.sign_out_fails {
            return Err(AuthError::Network("Mock Auth Error: sign-out".to_string()));
        }
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<SignedInUser>, AuthError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.session_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.session_error {
            return Err(error.clone());
        }
        Ok(self.session_user.clone())
    }

    async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

/// StaticAuthConnector
///
/// Hands out the same service for every request, whatever token it carries.
#[derive(Clone)]
pub struct StaticAuthConnector(pub AuthServiceState);

impl AuthConnector for StaticAuthConnector {
    fn connect(&self, _access_token: Option<String>) -> AuthServiceState {
        self.0.clone()
    }
}

// --- Extractors ---

/// Bearer token from `Authorization`, falling back to the access-token cookie. The scheme
/// name is case-insensitive.
fn request_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(ACCESS_TOKEN_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// SessionContext Extractor
///
/// Builds the request-scoped [`SessionStore`] from the token the request carries. The store
/// starts `Pending`; nothing talks to the auth service until someone needs the identity.
/// Extracting twice in one request yields the same store.
pub struct SessionContext(pub SessionState);

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
    AuthConnectorState: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<SessionState>() {
            return Ok(Self(existing.clone()));
        }

        let connector = AuthConnectorState::from_ref(state);
        let repo = RepositoryState::from_ref(state);

        let store: SessionState = Arc::new(SessionStore::new(
            connector.connect(request_token(parts)),
            repo,
        ));
        parts.extensions.insert(store.clone());
        Ok(Self(store))
    }
}

/// AuthUser Extractor
///
/// The resolved identity of an authenticated API request. Runs the session check once and
/// rejects with 401 when it yields nobody.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthConnectorState: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SessionContext(store) = match SessionContext::from_request_parts(parts, state).await {
            Ok(context) => context,
            Err(never) => match never {},
        };

        store
            .resolved()
            .await
            .identity
            .map(AuthUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
