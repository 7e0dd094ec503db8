//! Admin account management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::error::ApiResult;
use crate::models::{ApiResponse, SetFraudRequest, SetRoleRequest, UserResponse};
use crate::state::AppState;

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<UserResponse>>>> {
    let users = state.auth_service.list_users(&user.identity).await?;
    Ok(Json(ApiResponse::ok(users)))
}

/// PATCH /users/role/:id
pub async fn set_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    let updated = state
        .auth_service
        .set_role(&user.identity, id, req.role)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// PATCH /users/fraud/:id - Flag a vendor; their listings leave the catalogue
pub async fn set_fraud(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetFraudRequest>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    let updated = state
        .auth_service
        .set_fraud(&user.identity, id, req.fraud)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.auth_service.delete_user(&user.identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
