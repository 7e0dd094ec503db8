//! Booking routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::booking;
use crate::state::AppState;

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(booking::create_booking))
        .route("/bookings/user", get(booking::purchaser_bookings))
        .route("/bookings/vendor", get(booking::vendor_bookings))
        .route(
            "/bookings/:id",
            get(booking::get_booking).patch(booking::decide_booking),
        )
        .route("/bookings/:id/cancel", post(booking::cancel_booking))
}
