//! Admin user management and vendor analytics routes

use axum::{
    routing::{delete, get, patch},
    Router,
};

use crate::handlers::{stats, user};
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(user::list_users))
        .route("/users/role/:id", patch(user::set_role))
        .route("/users/fraud/:id", patch(user::set_fraud))
        .route("/users/:id", delete(user::delete_user))
        .route("/vendor-stats", get(stats::vendor_stats))
}
