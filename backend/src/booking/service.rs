//! Booking service layer - reservation and lifecycle transitions

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::booking::{
    Booking, BookingFilter, BookingStatus, BookingTransition, BookingView, CreateBookingRequest,
};
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Identity, UserRole};
use crate::store::{ReservationRequest, Store, StoreError};

/// Attempts per transition before a lost race is reported as a conflict
pub const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Result of a version-checked transition
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied { booking: Booking, from: BookingStatus },
    /// The booking was already where the caller wanted it
    Unchanged(Booking),
}

impl TransitionOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            TransitionOutcome::Applied { booking, .. } | TransitionOutcome::Unchanged(booking) => {
                booking
            }
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            TransitionOutcome::Applied { booking, .. } | TransitionOutcome::Unchanged(booking) => {
                booking
            }
        }
    }
}

/// Read the booking, let `plan` validate it and describe the change, then
/// write it at the version that was read. A lost race re-reads and
/// re-validates, so the second writer sees the first writer's status.
pub(crate) async fn transition_with_retry<F>(
    store: &dyn Store,
    booking_id: Uuid,
    mut plan: F,
) -> ServiceResult<TransitionOutcome>
where
    F: FnMut(&Booking) -> ServiceResult<Option<BookingTransition>>,
{
    for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
        let booking = store.get_booking(booking_id).await?;
        let transition = match plan(&booking)? {
            Some(t) => t,
            None => return Ok(TransitionOutcome::Unchanged(booking)),
        };

        match store.apply_transition(&transition).await {
            Ok(updated) => {
                return Ok(TransitionOutcome::Applied {
                    booking: updated,
                    from: transition.from,
                })
            }
            Err(StoreError::VersionConflict) => {
                tracing::debug!(
                    booking_id = %booking_id,
                    attempt,
                    "Booking changed concurrently, re-reading"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(booking_id = %booking_id, "Gave up on contended booking transition");
    Err(ServiceError::Conflict(
        "Booking is being modified concurrently, retry".into(),
    ))
}

/// Booking service
pub struct BookingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reserve seats and open a pending booking
    pub async fn create_booking(
        &self,
        actor: &Identity,
        request: CreateBookingRequest,
    ) -> ServiceResult<BookingView> {
        actor.require_role(UserRole::User)?;
        request.validate()?;

        let now = self.clock.now();
        let booking = self
            .store
            .reserve_booking(
                ReservationRequest {
                    listing_id: request.listing_id,
                    purchaser_id: actor.user_id,
                    quantity: request.quantity,
                },
                now,
            )
            .await
            .map_err(|e| {
                tracing::debug!(
                    listing_id = %request.listing_id,
                    quantity = request.quantity,
                    error = %e,
                    "Reservation declined"
                );
                ServiceError::from(e)
            })?;

        tracing::info!(
            booking_id = %booking.id,
            listing_id = %booking.listing_id,
            quantity = booking.quantity,
            total_price = booking.total_price,
            "Booking created"
        );
        Ok(BookingView::new(booking, now))
    }

    /// Vendor accepts or rejects a booking on one of their listings
    pub async fn decide(
        &self,
        actor: &Identity,
        booking_id: Uuid,
        decision: BookingStatus,
    ) -> ServiceResult<TransitionOutcome> {
        actor.require_role(UserRole::Vendor)?;
        if !matches!(decision, BookingStatus::Accepted | BookingStatus::Rejected) {
            return Err(ServiceError::Validation(
                "Decision must be accepted or rejected".into(),
            ));
        }

        let now = self.clock.now();
        let outcome = transition_with_retry(self.store.as_ref(), booking_id, |booking| {
            if booking.vendor_id != actor.user_id {
                return Err(ServiceError::Forbidden(
                    "Booking belongs to another vendor's listing".into(),
                ));
            }
            if decision == BookingStatus::Accepted && booking.is_expired(now) {
                return Err(ServiceError::ExpiredListing {
                    departure_at: booking.departure_at,
                });
            }
            booking.transition_to(decision, now).map(Some)
        })
        .await?;

        self.log_outcome(&outcome);
        Ok(outcome)
    }

    /// Purchaser withdraws a pending or accepted booking
    pub async fn cancel(&self, actor: &Identity, booking_id: Uuid) -> ServiceResult<TransitionOutcome> {
        let now = self.clock.now();
        let outcome = transition_with_retry(self.store.as_ref(), booking_id, |booking| {
            if booking.purchaser_id != actor.user_id {
                return Err(ServiceError::Forbidden(
                    "Only the purchaser can cancel this booking".into(),
                ));
            }
            booking.transition_to(BookingStatus::Cancelled, now).map(Some)
        })
        .await?;

        self.log_outcome(&outcome);
        Ok(outcome)
    }

    /// The caller's own bookings
    pub async fn purchaser_bookings(
        &self,
        actor: &Identity,
        status: Option<BookingStatus>,
    ) -> ServiceResult<Vec<BookingView>> {
        let filter = BookingFilter {
            purchaser_id: Some(actor.user_id),
            status,
            ..Default::default()
        };
        self.views(&filter).await
    }

    /// Bookings requested against the calling vendor's listings
    pub async fn vendor_bookings(
        &self,
        actor: &Identity,
        status: Option<BookingStatus>,
    ) -> ServiceResult<Vec<BookingView>> {
        actor.require_role(UserRole::Vendor)?;
        let filter = BookingFilter {
            vendor_id: Some(actor.user_id),
            status,
            ..Default::default()
        };
        self.views(&filter).await
    }

    /// One booking, visible to its purchaser, its vendor and admins
    pub async fn get_booking(&self, actor: &Identity, id: Uuid) -> ServiceResult<BookingView> {
        let booking = self.store.get_booking(id).await?;
        if !actor.is_admin()
            && actor.user_id != booking.purchaser_id
            && actor.user_id != booking.vendor_id
        {
            return Err(ServiceError::NotFound("Booking".into()));
        }
        Ok(BookingView::new(booking, self.clock.now()))
    }

    /// Client view of a booking as of now
    pub fn view(&self, booking: Booking) -> BookingView {
        BookingView::new(booking, self.clock.now())
    }

    async fn views(&self, filter: &BookingFilter) -> ServiceResult<Vec<BookingView>> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_bookings(filter)
            .await?
            .into_iter()
            .map(|b| BookingView::new(b, now))
            .collect())
    }

    fn log_outcome(&self, outcome: &TransitionOutcome) {
        if let TransitionOutcome::Applied { booking, from } = outcome {
            tracing::info!(
                booking_id = %booking.id,
                from = %from,
                to = %booking.status,
                released = booking.status.releases_inventory(),
                "Booking status changed"
            );
        }
    }
}
