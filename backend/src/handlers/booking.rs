//! Booking handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::booking::{
    BookingDecisionRequest, BookingEvent, BookingListQuery, BookingView, CreateBookingRequest,
    TransitionOutcome,
};
use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::state::AppState;

/// POST /bookings - Reserve seats and open a pending booking
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<BookingView>>)> {
    let view = state
        .booking_service
        .create_booking(&user.identity, req)
        .await?;

    state
        .ws_state
        .broadcast_event(BookingEvent::Created {
            booking_id: view.booking.id,
            listing_id: view.booking.listing_id,
            quantity: view.booking.quantity,
        })
        .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /bookings/user - The caller's bookings
pub async fn purchaser_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<BookingListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<BookingView>>>> {
    let bookings = state
        .booking_service
        .purchaser_bookings(&user.identity, query.status)
        .await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

/// GET /bookings/vendor - Bookings requested on the caller's listings
pub async fn vendor_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<BookingListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<BookingView>>>> {
    let bookings = state
        .booking_service
        .vendor_bookings(&user.identity, query.status)
        .await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

/// GET /bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<BookingView>>> {
    let view = state.booking_service.get_booking(&user.identity, id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// PATCH /bookings/:id - Vendor accepts or rejects
pub async fn decide_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<BookingDecisionRequest>,
) -> ApiResult<Json<ApiResponse<BookingView>>> {
    let outcome = state
        .booking_service
        .decide(&user.identity, id, req.status)
        .await?;
    Ok(Json(ApiResponse::ok(publish(&state, outcome).await)))
}

/// POST /bookings/:id/cancel - Purchaser withdraws
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<BookingView>>> {
    let outcome = state.booking_service.cancel(&user.identity, id).await?;
    Ok(Json(ApiResponse::ok(publish(&state, outcome).await)))
}

/// Broadcast an applied transition and build the response view
async fn publish(state: &AppState, outcome: TransitionOutcome) -> BookingView {
    if let TransitionOutcome::Applied { booking, from } = &outcome {
        state
            .ws_state
            .broadcast_event(BookingEvent::status_changed(booking, *from))
            .await;
    }
    state.booking_service.view(outcome.into_booking())
}
