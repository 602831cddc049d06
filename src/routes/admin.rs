use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Organization oversight. Nested under `/api/admin` and wrapped in the admin layer, which
/// applies the same role-satisfaction table as the page guard.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(handlers::get_admin_stats))
        .route("/users", get(handlers::list_users))
        .route("/tickets/{id}/assign", put(handlers::assign_ticket))
}
