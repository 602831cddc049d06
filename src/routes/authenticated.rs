use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Ticket endpoints for any signed-in role. Visibility inside the ticket table is decided per
/// request from the identity's `TicketScope`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/api/tickets",
            get(handlers::list_tickets).post(handlers::create_ticket),
        )
        // GET /api/tickets/changes
        // Server-sent events for ticket inserts/updates and new messages.
        .route("/api/tickets/changes", get(handlers::ticket_changes))
        .route("/api/tickets/{id}", get(handlers::get_ticket))
        .route(
            "/api/tickets/{id}/messages",
            get(handlers::list_messages).post(handlers::add_message),
        )
        .route(
            "/api/tickets/{id}/status",
            patch(handlers::update_ticket_status),
        )
        // POST /api/tickets/{id}/attachments
        // Presigned direct-to-storage upload slot (10 minutes, 25 MiB cap).
        .route(
            "/api/tickets/{id}/attachments",
            post(handlers::request_attachment_upload),
        )
}
