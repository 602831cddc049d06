use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, AuthServiceState, SignedInUser},
    models::{Identity, Role},
    repository::RepositoryState,
};

/// LoadingState
///
/// `Pending` until the first session check or login resolves, `Ready` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LoadingState {
    #[default]
    Pending,
    Ready,
}

/// Session
///
/// A point-in-time view of who is signed in. Readers always work on a cloned snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub loading: LoadingState,
}

impl Session {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(identity: Option<Identity>) -> Self {
        Self {
            identity,
            loading: LoadingState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.loading == LoadingState::Ready
    }
}

/// SessionStore
///
/// The single source of truth for "who is signed in" within one session context. Built with
/// its collaborators injected (auth service, profile repository) so it can be constructed
/// per request in the server and with mocks in tests.
///
/// Only [`check_session`](Self::check_session), [`login`](Self::login) and
/// [`logout`](Self::logout) write the session. Overlapping calls are not serialized: the
/// last one to resolve wins.
pub struct SessionStore {
    auth: AuthServiceState,
    repo: RepositoryState,
    state: RwLock<Session>,
    check_in_flight: AtomicBool,
}

/// Shared handle used by extractors and handlers.
pub type SessionState = Arc<SessionStore>;

impl SessionStore {
    pub fn new(auth: AuthServiceState, repo: RepositoryState) -> Self {
        Self::with_session(auth, repo, Session::pending())
    }

    /// Starts from an already-known session instead of `Pending`.
    pub fn with_session(auth: AuthServiceState, repo: RepositoryState, session: Session) -> Self {
        Self {
            auth,
            repo,
            state: RwLock::new(session),
            check_in_flight: AtomicBool::new(false),
        }
    }

    pub fn auth(&self) -> &AuthServiceState {
        &self.auth
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    pub fn is_check_in_flight(&self) -> bool {
        self.check_in_flight.load(Ordering::Acquire)
    }

    /// check_session
    ///
    /// Asks the auth service for an existing session and resolves the profile behind it.
    /// Never fails: any collaborator error is logged and leaves the session signed out.
    /// Always ends with `loading == Ready`.
    pub async fn check_session(&self) {
        let identity = match self.auth.get_session().await {
            Ok(Some(user)) => Some(self.resolve_identity(user).await),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "session check failed, continuing signed out");
                None
            }
        };

        tracing::debug!(signed_in = identity.is_some(), "session check resolved");
        *self.state.write().await = Session::ready(identity);
    }

    /// trigger_check
    ///
    /// Runs [`check_session`](Self::check_session) unless one is already in flight on this
    /// store. Returns `true` when this call ran (and awaited) the check.
    pub async fn trigger_check(&self) -> bool {
        if self
            .check_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _in_flight = InFlight(&self.check_in_flight);
        self.check_session().await;
        true
    }

    /// The session once past `Pending`. Triggers the one-shot check when needed; if another
    /// caller owns the in-flight check, the returned snapshot may still be pending.
    pub async fn resolved(&self) -> Session {
        let session = self.snapshot().await;
        if session.is_ready() {
            return session;
        }
        self.trigger_check().await;
        self.snapshot().await
    }

    /// login
    ///
    /// Signs in with the auth service, then resolves the profile. On failure the error is
    /// returned to the caller and the current identity is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let user = self
            .auth
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| tracing::info!(error = %e, "sign-in rejected"))?;

        let identity = self.resolve_identity(user).await;
        tracing::info!(user_id = %identity.id, role = %identity.role, "signed in");
        *self.state.write().await = Session::ready(Some(identity.clone()));
        Ok(identity)
    }

    /// logout
    ///
    /// Best-effort sign-out. The local identity is cleared whatever the auth service reports.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.sign_out().await {
            tracing::warn!(error = %e, "sign-out failed upstream, clearing local session anyway");
        }
        *self.state.write().await = Session::ready(None);
    }

    /// Builds the identity for an authenticated user. A missing or unreachable profile, or a
    /// role string outside the known set, falls back to the least-privileged role.
    async fn resolve_identity(&self, user: SignedInUser) -> Identity {
        match self.repo.fetch_profile(user.id).await {
            Ok(profile) => {
                let role = profile.role.parse().unwrap_or_else(|e| {
                    tracing::warn!(user_id = %user.id, error = %e, "defaulting to customer role");
                    Role::Customer
                });
                Identity {
                    id: user.id,
                    email: user.email.unwrap_or(profile.email),
                    role,
                    organization_id: profile.organization_id,
                }
            }
            Err(e) => {
                let e = AuthError::from(e);
                tracing::warn!(user_id = %user.id, error = %e, "defaulting to customer role");
                Identity {
                    id: user.id,
                    email: user.email.unwrap_or_default(),
                    role: Role::Customer,
                    organization_id: None,
                }
            }
        }
    }
}

/// Clears the in-flight flag even if the check future is dropped midway.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
