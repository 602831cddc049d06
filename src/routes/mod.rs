//! Router Module Index
//!
//! API routes split by the access they require, so protection is applied per module with an
//! axum layer rather than remembered in each handler. Page routes are not listed here: they
//! fall through to the access guard in `handlers::render_page`.

/// Reachable without a session: health, sign-in/out, session and navigation checks.
pub mod public;

/// Requires a resolved identity (`AuthUser`).
pub mod authenticated;

/// Requires the `admin` role requirement to be satisfied (admin or head-admin).
pub mod admin;
