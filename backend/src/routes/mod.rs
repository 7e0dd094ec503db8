//! Route definitions for the TicketHub API

mod auth;
mod booking;
mod listing;
mod payment;
mod user;

use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};

use crate::handlers::health;
use crate::middleware::{request_tracing, security_headers, SecurityPolicy};
use crate::state::AppState;
use crate::websocket;

pub use auth::auth_routes;
pub use booking::booking_routes;
pub use listing::listing_routes;
pub use payment::payment_routes;
pub use user::user_routes;

/// The full API with tracing and security headers. CORS and rate limiting
/// are applied by the binary.
pub fn create_router(state: AppState, security: SecurityPolicy) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(auth_routes())
        .merge(listing_routes())
        .merge(booking_routes())
        .merge(payment_routes())
        .merge(user_routes())
        .with_state(state)
        .layer(from_fn_with_state(security, security_headers))
        .layer(from_fn(request_tracing))
}
