use axum::{extract::State, Json};

use super::AuthenticatedUser;
use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::services::VendorStats;
use crate::state::AppState;

/// GET /vendor-stats - Revenue and seat figures for the calling vendor
pub async fn vendor_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<VendorStats>>> {
    let stats = state.analytics_service.vendor_stats(&user.identity).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
