//! Listing catalogue routes

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::listing;
use crate::state::AppState;

pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tickets",
            get(listing::search_listings).post(listing::create_listing),
        )
        .route("/tickets/locations", get(listing::get_locations))
        .route("/tickets/advertised", get(listing::get_advertised))
        .route("/tickets/vendor", get(listing::vendor_listings))
        .route("/tickets/admin", get(listing::all_listings))
        .route("/tickets/status/:id", patch(listing::set_verification))
        .route("/tickets/advertise/:id", patch(listing::set_advertised))
        .route(
            "/tickets/:id",
            get(listing::get_listing)
                .patch(listing::update_listing)
                .delete(listing::delete_listing),
        )
}
