use crate::{
    AppState,
    auth::{AuthError, AuthUser, SessionContext},
    guard::GuardDecision,
    models::{
        AssignTicketRequest, AttachmentUploadRequest, AttachmentUploadResponse,
        CreateMessageRequest, CreateTicketRequest, DashboardStats, Identity, LoginRequest,
        LoginResponse, NavigationResponse, Profile, Role, SessionView, Ticket, TicketMessage,
        TicketScope, TicketStatus, UpdateStatusRequest,
    },
    realtime::{ChangeEvent, ChangeKind},
    repository::NewAttachment,
    storage::{self, UploadRejection},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use uuid::Uuid;

const APP_SHELL: &str = concat!(
    "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">",
    "<title>Support Desk</title></head><body><div id=\"root\"></div>",
    "<script type=\"module\" src=\"/assets/index.js\"></script></body></html>"
);

const LOADING_SHELL: &str = concat!(
    "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">",
    "<title>Support Desk</title></head><body>",
    "<div id=\"root\" aria-busy=\"true\">Loading&hellip;</div></body></html>"
);

// --- Query Structs ---

#[derive(Deserialize, utoipa::IntoParams)]
pub struct NavigateQuery {
    /// Page route the SPA wants to enter, e.g. `/admin/users`.
    pub path: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct LoginQuery {
    /// Destination preserved by the guard when it sent the visitor to log in.
    pub redirect: Option<String>,
}

/// Only same-origin absolute paths are acceptable navigation targets. Control characters are
/// refused since browsers strip them, which can turn `/\t/host` into `//host`.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && !target.chars().any(char::is_control)
}

/// Unmatched API paths are not pages.
fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

// --- Session & Navigation ---

/// login
///
/// [Public Route] Signs in through the auth collaborator and resolves the profile. The
/// `landing` is the preserved `redirect` target when the new identity may enter it,
/// otherwise the role's default route.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    params(LoginQuery),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 502, description = "Auth service unavailable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    Query(query): Query<LoginQuery>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let identity = session.login(&payload.email, &payload.password).await?;

    let snapshot = session.snapshot().await;
    let landing = match query.redirect {
        Some(target)
            if is_local_path(&target)
                && state.guard.evaluate(&snapshot, &target) == GuardDecision::Allowed =>
        {
            target
        }
        _ => state.guard.policy().landing_route(identity.role).to_string(),
    };

    Ok(Json(LoginResponse {
        access_token: session.auth().access_token().await,
        identity,
        landing,
    }))
}

/// logout
///
/// [Public Route] Always 204: the local session is cleared even if the upstream sign-out fails.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Signed out"))
)]
pub async fn logout(SessionContext(session): SessionContext) -> StatusCode {
    session.logout().await;
    StatusCode::NO_CONTENT
}

/// get_session
///
/// [Public Route] The resolved session for the token the request carries.
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses((status = 200, description = "Session", body = SessionView))
)]
pub async fn get_session(SessionContext(session): SessionContext) -> Json<SessionView> {
    let resolved = session.resolved().await;
    Json(SessionView {
        status: resolved.loading,
        identity: resolved.identity,
    })
}

/// navigate
///
/// [Public Route] Runs the access guard for a page route and returns the decision for the
/// SPA router to act on.
#[utoipa::path(
    get,
    path = "/api/navigate",
    params(NavigateQuery),
    responses(
        (status = 200, description = "Guard decision", body = NavigationResponse),
        (status = 400, description = "Path is not a local route")
    )
)]
pub async fn navigate(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    Query(query): Query<NavigateQuery>,
) -> Result<Json<NavigationResponse>, StatusCode> {
    if !is_local_path(&query.path) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let decision = state.guard.resolve(&session, &query.path).await;
    Ok(Json(decision.into()))
}

/// render_page
///
/// Router fallback for page loads. Guard redirects become `303 See Other`; allowed pages get
/// the SPA shell; a session still resolving elsewhere gets the loading shell. Anything that
/// is not a GET/HEAD, or that sits under `/api`, is a plain 404.
pub async fn render_page(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    method: Method,
    uri: Uri,
) -> Response {
    if (method != Method::GET && method != Method::HEAD) || is_api_path(uri.path()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let requested = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());

    match state.guard.resolve(&session, requested).await {
        GuardDecision::Initializing => Html(LOADING_SHELL).into_response(),
        GuardDecision::Unauthenticated { redirect_to } | GuardDecision::Denied { redirect_to } => {
            Redirect::to(&redirect_to).into_response()
        }
        GuardDecision::Allowed => Html(APP_SHELL).into_response(),
    }
}

// --- Tickets ---

/// Loads a ticket and hides it (404) unless it falls inside the caller's scope.
async fn visible_ticket(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<Ticket, StatusCode> {
    let scope = TicketScope::for_identity(identity, state.guard.policy())
        .ok_or(StatusCode::FORBIDDEN)?;
    state
        .repo
        .get_ticket(id)
        .await
        .filter(|ticket| scope.contains(ticket))
        .ok_or(StatusCode::NOT_FOUND)
}

/// list_tickets
///
/// [Authenticated Route] Customers see their own tickets, agents their assigned ones, admins
/// their whole organization.
#[utoipa::path(
    get,
    path = "/api/tickets",
    responses((status = 200, description = "Visible tickets", body = [Ticket]))
)]
pub async fn list_tickets(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Ticket>>, StatusCode> {
    let scope = TicketScope::for_identity(&identity, state.guard.policy())
        .ok_or(StatusCode::FORBIDDEN)?;
    Ok(Json(state.repo.list_tickets(scope).await))
}

/// create_ticket
///
/// [Authenticated Route] Customers open tickets within their own organization.
#[utoipa::path(
    post,
    path = "/api/tickets",
    request_body = CreateTicketRequest,
    responses(
        (status = 201, description = "Created", body = Ticket),
        (status = 403, description = "Not a customer of an organization"),
        (status = 422, description = "Empty subject")
    )
)]
pub async fn create_ticket(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), StatusCode> {
    if !state.guard.policy().satisfies(Role::Customer, identity.role) {
        return Err(StatusCode::FORBIDDEN);
    }
    let organization_id = identity.organization_id.ok_or(StatusCode::FORBIDDEN)?;
    if payload.subject.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let ticket = state
        .repo
        .create_ticket(organization_id, identity.id, payload)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(ticket_id = %ticket.id, customer_id = %identity.id, "ticket opened");
    state.feed.publish(ChangeEvent::ticket(ChangeKind::Insert, &ticket));
    Ok((StatusCode::CREATED, Json(ticket)))
}

#[utoipa::path(
    get,
    path = "/api/tickets/{id}",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Found", body = Ticket),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_ticket(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, StatusCode> {
    visible_ticket(&state, &identity, id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/tickets/{id}/messages",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses((status = 200, description = "Conversation", body = [TicketMessage]))
)]
pub async fn list_messages(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketMessage>>, StatusCode> {
    let ticket = visible_ticket(&state, &identity, id).await?;
    Ok(Json(state.repo.list_messages(ticket.id).await))
}

/// add_message
///
/// [Authenticated Route] Replies on a visible ticket. Blank bodies are rejected.
#[utoipa::path(
    post,
    path = "/api/tickets/{id}/messages",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Posted", body = TicketMessage),
        (status = 422, description = "Empty message")
    )
)]
pub async fn add_message(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<TicketMessage>), StatusCode> {
    let ticket = visible_ticket(&state, &identity, id).await?;
    let body = payload.body.trim();
    if body.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let message = state
        .repo
        .add_message(ticket.id, identity.id, body.to_string())
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    state.feed.publish(ChangeEvent::message(message.id, &ticket));
    Ok((StatusCode::CREATED, Json(message)))
}

/// update_ticket_status
///
/// [Authenticated Route] Agents and admins may move a ticket to any status; customers may
/// only close their own.
#[utoipa::path(
    patch,
    path = "/api/tickets/{id}/status",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated", body = Ticket),
        (status = 403, description = "Customers may only close tickets")
    )
)]
pub async fn update_ticket_status(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Ticket>, StatusCode> {
    let ticket = visible_ticket(&state, &identity, id).await?;
    if identity.role == Role::Customer && payload.status != TicketStatus::Closed {
        return Err(StatusCode::FORBIDDEN);
    }

    let updated = state
        .repo
        .update_ticket_status(ticket.id, payload.status)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    tracing::info!(ticket_id = %updated.id, status = updated.status.as_str(), "ticket status changed");
    state.feed.publish(ChangeEvent::ticket(ChangeKind::Update, &updated));
    Ok(Json(updated))
}

/// request_attachment_upload
///
/// [Authenticated Route] Issues a presigned upload slot for a visible ticket and records the
/// attachment metadata. The file itself goes straight from the browser to object storage.
#[utoipa::path(
    post,
    path = "/api/tickets/{id}/attachments",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = AttachmentUploadRequest,
    responses(
        (status = 200, description = "Upload slot", body = AttachmentUploadResponse),
        (status = 413, description = "Too large"),
        (status = 422, description = "Empty or missing metadata")
    )
)]
pub async fn request_attachment_upload(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachmentUploadRequest>,
) -> Response {
    let ticket = match visible_ticket(&state, &identity, id).await {
        Ok(ticket) => ticket,
        Err(status) => return status.into_response(),
    };

    if let Err(rejection) =
        storage::validate_upload(&payload.filename, &payload.file_type, payload.size_bytes)
    {
        let status = match rejection {
            UploadRejection::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadRejection::Empty | UploadRejection::MissingMetadata => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        return (status, rejection.to_string()).into_response();
    }

    let object_key = storage::attachment_key(ticket.id, &payload.filename);
    let upload_url = match state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(ticket_id = %ticket.id, "storage error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed").into_response();
        }
    };

    let recorded = state
        .repo
        .record_attachment(NewAttachment {
            ticket_id: ticket.id,
            uploaded_by: identity.id,
            object_key: object_key.clone(),
            filename: payload.filename,
            content_type: payload.file_type,
            size_bytes: payload.size_bytes,
        })
        .await;

    match recorded {
        Some(attachment) => Json(AttachmentUploadResponse {
            upload_url,
            resource_key: object_key,
            attachment,
        })
        .into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Failed").into_response(),
    }
}

/// ticket_changes
///
/// [Authenticated Route] Server-sent stream of ticket changes within the caller's scope. The
/// subscription is released when the client disconnects and the stream is dropped.
#[utoipa::path(
    get,
    path = "/api/tickets/changes",
    responses((status = 200, description = "text/event-stream of ChangeEvent"))
)]
pub async fn ticket_changes(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    let scope = TicketScope::for_identity(&identity, state.guard.policy())
        .ok_or(StatusCode::FORBIDDEN)?;
    let subscription = state.feed.subscribe(scope);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let change = subscription.recv().await?;
        let event = Event::default().event("ticket_change").json_data(&change);
        Some((event, subscription))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// --- Admin ---

/// get_admin_stats
///
/// [Admin Route] Dashboard counters for the admin's organization.
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses((status = 200, description = "Stats", body = DashboardStats))
)]
pub async fn get_admin_stats(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, StatusCode> {
    let organization_id = identity.organization_id.ok_or(StatusCode::FORBIDDEN)?;
    Ok(Json(state.repo.get_stats(organization_id).await))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses((status = 200, description = "Organization members", body = [Profile]))
)]
pub async fn list_users(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Profile>>, StatusCode> {
    let organization_id = identity.organization_id.ok_or(StatusCode::FORBIDDEN)?;
    Ok(Json(state.repo.list_profiles(organization_id).await))
}

/// assign_ticket
///
/// [Admin Route] Hands a ticket to an agent of the same organization.
#[utoipa::path(
    put,
    path = "/api/admin/tickets/{id}/assign",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = AssignTicketRequest,
    responses(
        (status = 200, description = "Assigned", body = Ticket),
        (status = 404, description = "Ticket not in this organization"),
        (status = 422, description = "Assignee is not an agent of this organization")
    )
)]
pub async fn assign_ticket(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTicketRequest>,
) -> Result<Json<Ticket>, StatusCode> {
    let ticket = visible_ticket(&state, &identity, id).await?;

    let is_org_agent = match state.repo.fetch_profile(payload.agent_id).await {
        Ok(profile) => {
            profile.role.parse::<Role>() == Ok(Role::Agent)
                && profile.organization_id == Some(ticket.organization_id)
        }
        Err(e) => {
            tracing::debug!(agent_id = %payload.agent_id, "assignee lookup failed: {}", e);
            false
        }
    };
    if !is_org_agent {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let updated = state
        .repo
        .assign_ticket(ticket.id, payload.agent_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    tracing::info!(ticket_id = %updated.id, agent_id = %payload.agent_id, "ticket assigned");
    state.feed.publish(ChangeEvent::ticket(ChangeKind::Update, &updated));
    Ok(Json(updated))
}
