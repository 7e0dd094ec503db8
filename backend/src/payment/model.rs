//! Payment models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::BookingView;

/// Gateway-side state of a checkout session
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// A hosted checkout session as reported by the gateway
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub booking_id: Uuid,
    /// Amount in minor currency units
    pub amount: i64,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
}

/// What the gateway needs to open a session
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub description: String,
    pub unit_amount: i64,
    pub quantity: i32,
    pub currency: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn total(&self) -> i64 {
        self.unit_amount.saturating_mul(i64::from(self.quantity))
    }
}

/// Request DTO: open a checkout session for a booking
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    #[serde(alias = "bookingId")]
    pub booking_id: Uuid,
}

/// Response DTO: where to send the purchaser
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: String,
}

/// Request DTO: purchaser returned from the hosted checkout
#[derive(Debug, Deserialize)]
pub struct PaymentSuccessRequest {
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

/// Result of confirming a payment
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub booking: BookingView,
    pub transaction_id: Option<String>,
    /// The booking was already paid; nothing changed
    pub already_paid: bool,
}

/// Gateway webhook body
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
}

/// What a webhook delivery did
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed {
        booking_id: Uuid,
        listing_id: Uuid,
        already_paid: bool,
    },
    Ignored { event_type: String },
    /// Captured, but the booking can no longer be paid; settled by refund
    Unfulfillable { session_id: String, reason: String },
}
