//! Payment service layer - checkout sessions and capture confirmation

use std::sync::Arc;
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::model::{
    CheckoutRequest, CheckoutSessionResponse, PaymentConfirmation, PaymentStatus, WebhookOutcome,
    WebhookPayload,
};
use crate::booking::service::{transition_with_retry, TransitionOutcome};
use crate::booking::{BookingFilter, BookingStatus, BookingView};
use crate::clock::Clock;
use crate::config::PaymentConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Identity;
use crate::store::{Store, StoreError};

/// Checkout parameters that do not vary per booking
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
}

impl From<&PaymentConfig> for CheckoutSettings {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            currency: config.currency.clone(),
        }
    }
}

/// Payment service
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    settings: CheckoutSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            settings,
        }
    }

    /// Open a hosted checkout for an accepted booking
    pub async fn create_checkout_session(
        &self,
        actor: &Identity,
        booking_id: Uuid,
    ) -> ServiceResult<CheckoutSessionResponse> {
        let booking = self.store.get_booking(booking_id).await?;
        if booking.purchaser_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the purchaser can pay for this booking".into(),
            ));
        }
        match booking.status {
            BookingStatus::Accepted => {}
            BookingStatus::Paid => {
                return Err(ServiceError::Conflict("Booking is already paid".into()))
            }
            from => {
                return Err(ServiceError::InvalidStateTransition {
                    from,
                    to: BookingStatus::Paid,
                })
            }
        }

        let now = self.clock.now();
        if booking.is_expired(now) {
            return Err(ServiceError::ExpiredListing {
                departure_at: booking.departure_at,
            });
        }

        let purchaser = self.store.get_user(actor.user_id).await?;
        let request = CheckoutRequest {
            booking_id: booking.id,
            description: format!(
                "{}: {} to {}",
                booking.listing_title, booking.from_location, booking.to_location
            ),
            unit_amount: booking.unit_price,
            quantity: booking.quantity,
            currency: self.settings.currency.clone(),
            customer_email: Some(purchaser.email),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };
        let session = self.gateway.create_checkout_session(&request).await?;

        self.store
            .attach_payment_session(booking.id, booking.version, &session.id, now)
            .await
            .map_err(|e| match e {
                StoreError::VersionConflict => ServiceError::Conflict(
                    "Booking changed while opening checkout, retry".into(),
                ),
                other => other.into(),
            })?;

        tracing::info!(
            booking_id = %booking.id,
            session_id = %session.id,
            amount = session.amount,
            "Checkout session attached to booking"
        );
        Ok(CheckoutSessionResponse {
            id: session.id,
            url: session.url,
        })
    }

    /// Verify a session with the gateway and mark its booking paid.
    ///
    /// Safe to call repeatedly: once the booking is paid further calls
    /// report `already_paid` and change nothing. `purchaser` is `None` for
    /// webhook deliveries.
    pub async fn confirm_payment(
        &self,
        session_id: &str,
        purchaser: Option<&Identity>,
    ) -> ServiceResult<PaymentConfirmation> {
        let session = self.gateway.retrieve_session(session_id).await?;
        if session.payment_status != PaymentStatus::Paid {
            tracing::debug!(session_id, "Payment confirmation for unpaid session");
            return Err(ServiceError::PaymentVerificationFailed(format!(
                "Checkout session {} is not paid",
                session_id
            )));
        }

        let booking = self.store.get_booking(session.booking_id).await?;
        if let Some(actor) = purchaser {
            if booking.purchaser_id != actor.user_id {
                return Err(ServiceError::Forbidden(
                    "Checkout session belongs to another purchaser".into(),
                ));
            }
        }
        if session.amount != booking.total_price {
            tracing::warn!(
                booking_id = %booking.id,
                session_id,
                paid = session.amount,
                due = booking.total_price,
                "Captured amount does not match booking total"
            );
            return Err(ServiceError::PaymentVerificationFailed(format!(
                "Captured amount {} does not match booking total {}",
                session.amount, booking.total_price
            )));
        }

        let transaction_id = session
            .transaction_id
            .clone()
            .unwrap_or_else(|| session.id.clone());
        let now = self.clock.now();

        let outcome = transition_with_retry(self.store.as_ref(), booking.id, |current| {
            if current.status == BookingStatus::Paid {
                if current.transaction_id.as_deref() != Some(transaction_id.as_str()) {
                    tracing::warn!(
                        booking_id = %current.id,
                        recorded = ?current.transaction_id,
                        replayed = %transaction_id,
                        "Booking already paid under another transaction"
                    );
                }
                return Ok(None);
            }
            if current.is_expired(now) {
                return Err(ServiceError::ExpiredListing {
                    departure_at: current.departure_at,
                });
            }
            current
                .transition_to(BookingStatus::Paid, now)
                .map(|t| Some(t.with_transaction(transaction_id.clone())))
        })
        .await?;

        let already_paid = matches!(outcome, TransitionOutcome::Unchanged(_));
        let booking = outcome.into_booking();
        if already_paid {
            tracing::info!(booking_id = %booking.id, session_id, "Payment replay ignored");
        } else {
            tracing::info!(
                booking_id = %booking.id,
                transaction_id = %transaction_id,
                amount = booking.total_price,
                "Booking paid"
            );
        }

        Ok(PaymentConfirmation {
            transaction_id: booking.transaction_id.clone(),
            booking: BookingView::new(booking, now),
            already_paid,
        })
    }

    /// Apply a gateway webhook whose signature has already been checked
    pub async fn handle_webhook(&self, payload: WebhookPayload) -> ServiceResult<WebhookOutcome> {
        match payload.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                match self.confirm_payment(&payload.session_id, None).await {
                    Ok(confirmation) => Ok(WebhookOutcome::Confirmed {
                        booking_id: confirmation.booking.booking.id,
                        listing_id: confirmation.booking.booking.listing_id,
                        already_paid: confirmation.already_paid,
                    }),
                    // redelivery cannot change these, so acknowledge the event
                    Err(
                        e @ (ServiceError::InvalidStateTransition { .. }
                        | ServiceError::ExpiredListing { .. }
                        | ServiceError::NotFound(_)),
                    ) => {
                        tracing::warn!(
                            session_id = %payload.session_id,
                            error = %e,
                            "Captured payment for a booking that cannot be paid"
                        );
                        Ok(WebhookOutcome::Unfulfillable {
                            session_id: payload.session_id,
                            reason: e.to_string(),
                        })
                    }
                    Err(e) => Err(e),
                }
            }
            other => {
                // failures and expiries leave the booking accepted so the purchaser can retry
                tracing::info!(
                    event_type = other,
                    session_id = %payload.session_id,
                    "Webhook event ignored"
                );
                Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    /// The caller's paid bookings, newest first
    pub async fn payment_history(&self, actor: &Identity) -> ServiceResult<Vec<BookingView>> {
        let filter = BookingFilter {
            purchaser_id: Some(actor.user_id),
            status: Some(BookingStatus::Paid),
            ..Default::default()
        };
        let now = self.clock.now();
        Ok(self
            .store
            .list_bookings(&filter)
            .await?
            .into_iter()
            .map(|b| BookingView::new(b, now))
            .collect())
    }
}
