//! Authentication HTTP handlers

use axum::{extract::State, http::StatusCode, Json};

use super::AuthenticatedUser;
use crate::error::ApiResult;
use crate::models::{ApiResponse, AuthTokenResponse, LoginRequest, RegisterRequest, UserResponse};
use crate::state::AppState;

/// POST /auth/register - Create an account and receive a token
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AuthTokenResponse>>)> {
    let tokens = state.auth_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(tokens))))
}

/// POST /auth/login - Exchange credentials for a token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthTokenResponse>>> {
    let tokens = state.auth_service.login(req).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// GET /auth/me - Get current authenticated user
pub async fn get_current_user(user: AuthenticatedUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::ok(user.user.into()))
}
