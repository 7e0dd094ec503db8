//! Payment routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payment;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/create-checkout-session",
            post(payment::create_checkout_session),
        )
        .route("/payment-success", post(payment::payment_success))
        .route("/payments/webhook", post(payment::payment_webhook))
        .route("/payments/history", get(payment::payment_history))
}
