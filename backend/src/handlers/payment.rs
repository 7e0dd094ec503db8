//! Payment handlers

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};

use super::AuthenticatedUser;
use crate::booking::{BookingEvent, BookingStatus, BookingView};
use crate::error::{ApiError, ApiResult};
use crate::payment::{
    webhook, CheckoutSessionResponse, CreateCheckoutRequest, PaymentConfirmation,
    PaymentSuccessRequest, WebhookOutcome, WebhookPayload,
};
use crate::models::ApiResponse;
use crate::state::AppState;

/// POST /create-checkout-session - Open a hosted checkout for an accepted booking
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<ApiResponse<CheckoutSessionResponse>>> {
    let session = state
        .payment_service
        .create_checkout_session(&user.identity, req.booking_id)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}

/// POST /payment-success - Purchaser returned from checkout
pub async fn payment_success(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<PaymentSuccessRequest>,
) -> ApiResult<Json<ApiResponse<PaymentConfirmation>>> {
    let confirmation = state
        .payment_service
        .confirm_payment(&req.session_id, Some(&user.identity))
        .await?;

    if !confirmation.already_paid {
        state
            .ws_state
            .broadcast_event(BookingEvent::status_changed(
                &confirmation.booking.booking,
                BookingStatus::Accepted,
            ))
            .await;
    }

    Ok(Json(ApiResponse::ok(confirmation)))
}

/// POST /payments/webhook - Signed gateway notification
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<WebhookOutcome>>> {
    // Fail closed without a secret
    let secret = match state.webhook_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret,
        _ => {
            tracing::error!("Webhook secret not configured - rejecting request");
            return Err(ApiError::ServiceUnavailable(
                "Webhook endpoint is not configured".to_string(),
            ));
        }
    };

    let signature = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !webhook::verify(secret, &body, signature) {
        tracing::warn!("Webhook signature mismatch");
        return Err(ApiError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)?;
    let outcome = state.payment_service.handle_webhook(payload).await?;

    if let WebhookOutcome::Confirmed {
        booking_id,
        listing_id,
        already_paid: false,
    } = &outcome
    {
        state
            .ws_state
            .broadcast_event(BookingEvent::StatusChanged {
                booking_id: *booking_id,
                listing_id: *listing_id,
                from: BookingStatus::Accepted,
                to: BookingStatus::Paid,
            })
            .await;
    }

    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET /payments/history - The caller's paid bookings
pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<BookingView>>>> {
    let history = state.payment_service.payment_history(&user.identity).await?;
    Ok(Json(ApiResponse::ok(history)))
}
