use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    models::NavigationResponse,
    policy::RouteGuardPolicy,
    session::{Session, SessionStore},
};

/// GuardState
///
/// The four states of the access guard for a single route request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GuardState {
    Initializing,
    Unauthenticated,
    AuthenticatedDenied,
    AuthenticatedAllowed,
}

/// GuardDecision
///
/// What the rendering layer should do: show a loading placeholder, navigate elsewhere, or
/// render the requested page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Initializing,
    Unauthenticated { redirect_to: String },
    Denied { redirect_to: String },
    Allowed,
}

impl GuardDecision {
    pub fn state(&self) -> GuardState {
        match self {
            GuardDecision::Initializing => GuardState::Initializing,
            GuardDecision::Unauthenticated { .. } => GuardState::Unauthenticated,
            GuardDecision::Denied { .. } => GuardState::AuthenticatedDenied,
            GuardDecision::Allowed => GuardState::AuthenticatedAllowed,
        }
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            GuardDecision::Unauthenticated { redirect_to } | GuardDecision::Denied { redirect_to } => {
                Some(redirect_to)
            }
            GuardDecision::Initializing | GuardDecision::Allowed => None,
        }
    }
}

impl From<GuardDecision> for NavigationResponse {
    fn from(decision: GuardDecision) -> Self {
        NavigationResponse {
            state: decision.state(),
            redirect_to: decision.redirect_to().map(str::to_string),
        }
    }
}

/// evaluate
///
/// Pure transition function from (session, requested route, policy) to a decision.
///
/// 1. Pending session: `Initializing`, never a redirect.
/// 2. Public route: `Allowed` for everyone.
/// 3. No identity: redirect to the login route for the prefix, keeping the destination.
/// 4. Role not admitted: redirect to the identity's own landing route.
/// 5. Otherwise `Allowed`.
pub fn evaluate(session: &Session, requested: &str, policy: &RouteGuardPolicy) -> GuardDecision {
    if !session.is_ready() {
        return GuardDecision::Initializing;
    }

    let Some(access) = policy.access_for(requested) else {
        return GuardDecision::Allowed;
    };

    let Some(identity) = &session.identity else {
        return GuardDecision::Unauthenticated {
            redirect_to: policy.login_redirect(requested),
        };
    };

    if policy.admits(access, identity.role) {
        GuardDecision::Allowed
    } else {
        GuardDecision::Denied {
            redirect_to: policy.landing_route(identity.role).to_string(),
        }
    }
}

/// AccessGuard
///
/// Pairs the shared routing policy with the one-shot session check: a pending session
/// triggers `check_session` at most once and is re-evaluated only after that check has
/// fully resolved.
#[derive(Clone, Default)]
pub struct AccessGuard {
    policy: Arc<RouteGuardPolicy>,
}

impl AccessGuard {
    pub fn new(policy: RouteGuardPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &RouteGuardPolicy {
        &self.policy
    }

    pub fn evaluate(&self, session: &Session, requested: &str) -> GuardDecision {
        evaluate(session, requested, &self.policy)
    }

    /// resolve
    ///
    /// Evaluates the store's current session. When it is still pending, runs the session
    /// check (unless another caller already has it in flight) and evaluates again. There is
    /// no retry: a failed check leaves the session signed out.
    pub async fn resolve(&self, store: &SessionStore, requested: &str) -> GuardDecision {
        let decision = self.evaluate(&store.snapshot().await, requested);
        if decision != GuardDecision::Initializing {
            return decision;
        }

        if !store.trigger_check().await {
            tracing::debug!(route = requested, "session check already in flight");
            return GuardDecision::Initializing;
        }

        let decision = self.evaluate(&store.snapshot().await, requested);
        tracing::debug!(route = requested, state = ?decision.state(), "route guard resolved");
        decision
    }
}
