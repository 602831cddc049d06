use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control core.
pub mod guard;
pub mod policy;
pub mod session;

// Collaborators and application services.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod repository;
pub mod storage;

pub mod routes;
use auth::AuthUser;
use models::Role;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{AuthConnectorState, SupabaseConnector};
pub use config::AppConfig;
pub use guard::AccessGuard;
pub use policy::RouteGuardPolicy;
pub use realtime::ChangeFeed;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every JSON endpoint, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout, handlers::get_session, handlers::navigate,
        handlers::list_tickets, handlers::create_ticket, handlers::get_ticket,
        handlers::list_messages, handlers::add_message, handlers::update_ticket_status,
        handlers::request_attachment_upload, handlers::ticket_changes,
        handlers::get_admin_stats, handlers::list_users, handlers::assign_ticket
    ),
    components(
        schemas(
            models::Role, models::Identity, models::Profile, models::Ticket,
            models::TicketStatus, models::TicketPriority, models::TicketMessage,
            models::Attachment, models::LoginRequest, models::LoginResponse,
            models::SessionView, models::NavigationResponse, models::CreateTicketRequest,
            models::CreateMessageRequest, models::UpdateStatusRequest,
            models::AssignTicketRequest, models::AttachmentUploadRequest,
            models::AttachmentUploadResponse, models::DashboardStats,
            session::LoadingState, guard::GuardState, realtime::ChangeEvent,
        )
    ),
    tags(
        (name = "support-desk", description = "Support desk access control and ticket API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service the handlers need. Cloned per request;
/// every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Profiles and tickets.
    pub repo: RepositoryState,
    /// Attachment object storage.
    pub storage: StorageState,
    /// Builds a per-request auth client from the request's token.
    pub auth: AuthConnectorState,
    /// Route policy plus the one-shot session check.
    pub guard: AccessGuard,
    /// In-process ticket change fan-out.
    pub feed: ChangeFeed,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AuthConnectorState {
    fn from_ref(app_state: &AppState) -> AuthConnectorState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for AccessGuard {
    fn from_ref(app_state: &AppState) -> AccessGuard {
        app_state.guard.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects with 401 before the handler runs unless `AuthUser` resolves. The resolved session
/// stays in the request extensions, so the handler's own `AuthUser` does not check again.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// 401 without a session, 403 unless the identity satisfies the `admin` requirement.
async fn admin_middleware(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !state.guard.policy().satisfies(Role::Admin, identity.role) {
        tracing::info!(user_id = %identity.id, role = %identity.role, "admin route denied");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles API routes, the page fallback guarded by the access guard, and the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/api/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        // Every other path is a page of the SPA and goes through the access guard.
        .fallback(handlers::render_page)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One span per request, tagged with the `x-request-id` so every log line of a request
/// correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
