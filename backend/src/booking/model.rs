//! Booking models and the booking state machine

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::expiry::is_expired;
use crate::error::{ServiceError, ServiceResult};
use crate::listing::{Listing, TransportType};

/// A purchaser's request for seats on a listing
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub vendor_id: Uuid,
    pub purchaser_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    pub status: BookingStatus,
    pub version: i32,
    // Journey snapshot taken at creation
    pub listing_title: String,
    #[serde(rename = "from")]
    pub from_location: String,
    #[serde(rename = "to")]
    pub to_location: String,
    pub transport_type: TransportType,
    pub departure_at: DateTime<Utc>,
    pub payment_session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build the pending booking for a reservation against `listing`
    pub fn from_reservation(
        listing: &Listing,
        purchaser_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            vendor_id: listing.vendor_id,
            purchaser_id,
            quantity,
            unit_price: listing.price,
            total_price: listing.price.saturating_mul(i64::from(quantity)),
            status: BookingStatus::Pending,
            version: 0,
            listing_title: listing.title.clone(),
            from_location: listing.from_location.clone(),
            to_location: listing.to_location.clone(),
            transport_type: listing.transport_type,
            departure_at: listing.departure_at,
            payment_session_id: None,
            transaction_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(now, self.departure_at)
    }

    /// Describe moving this booking to `to`, validating the edge first
    pub fn transition_to(
        &self,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> ServiceResult<BookingTransition> {
        self.status.transition(to)?;
        Ok(BookingTransition {
            booking_id: self.id,
            expected_version: self.version,
            from: self.status,
            to,
            listing_id: self.listing_id,
            quantity: self.quantity,
            transaction_id: None,
            at,
        })
    }
}

/// Booking lifecycle states
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Accepted, Rejected)
                | (Accepted, Paid)
                | (Pending, Cancelled)
                | (Accepted, Cancelled)
        )
    }

    pub fn transition(self, to: BookingStatus) -> ServiceResult<BookingStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ServiceError::InvalidStateTransition { from: self, to })
        }
    }

    /// Entering this state hands the seats back to the listing
    pub fn releases_inventory(self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Paid | BookingStatus::Cancelled
        )
    }

    /// Still holding seats on the listing
    pub fn is_open(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version-checked status change, applied atomically by the store.
///
/// The store writes it only if the booking is still at `expected_version`
/// and `from`; when `to` releases inventory the listing's remaining seats
/// are restored in the same transaction.
#[derive(Debug, Clone)]
pub struct BookingTransition {
    pub booking_id: Uuid,
    pub expected_version: i32,
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub listing_id: Uuid,
    pub quantity: i32,
    pub transaction_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl BookingTransition {
    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

/// Booking as returned to clients, with flags derived from the clock
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub expired: bool,
    /// Accepted and not yet departed
    pub payable: bool,
}

impl BookingView {
    pub fn new(booking: Booking, now: DateTime<Utc>) -> Self {
        let expired = booking.is_expired(now);
        let payable = booking.status == BookingStatus::Accepted && !expired;
        Self {
            booking,
            expired,
            payable,
        }
    }
}

/// Request DTO for reserving seats
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[serde(alias = "ticket_id")]
    pub listing_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Vendor accept / reject decision
#[derive(Debug, Deserialize)]
pub struct BookingDecisionRequest {
    pub status: BookingStatus,
}

/// Storage-level booking filter
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub purchaser_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.purchaser_id.map_or(true, |id| booking.purchaser_id == id)
            && self.vendor_id.map_or(true, |id| booking.vendor_id == id)
            && self.status.map_or(true, |s| booking.status == s)
    }
}

/// Query parameters for booking lists
#[derive(Debug, Default, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
}

/// Booking event types for real-time updates
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum BookingEvent {
    Created {
        booking_id: Uuid,
        listing_id: Uuid,
        quantity: i32,
    },
    StatusChanged {
        booking_id: Uuid,
        listing_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    },
    AdvertisedChanged {
        listing_id: Uuid,
        advertised: bool,
    },
}

impl BookingEvent {
    pub fn listing_id(&self) -> Uuid {
        match self {
            BookingEvent::Created { listing_id, .. }
            | BookingEvent::StatusChanged { listing_id, .. }
            | BookingEvent::AdvertisedChanged { listing_id, .. } => *listing_id,
        }
    }

    pub fn status_changed(booking: &Booking, from: BookingStatus) -> Self {
        BookingEvent::StatusChanged {
            booking_id: booking.id,
            listing_id: booking.listing_id,
            from,
            to: booking.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 5] = [Pending, Accepted, Rejected, Paid, Cancelled];

    #[test]
    fn only_listed_edges_are_allowed() {
        let allowed = [
            (Pending, Accepted),
            (Pending, Rejected),
            (Accepted, Rejected),
            (Accepted, Paid),
            (Pending, Cancelled),
            (Accepted, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(matches!(
                    from.transition(to),
                    Err(ServiceError::InvalidStateTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn pending_cannot_jump_to_paid() {
        let err = Pending.transition(Paid).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidStateTransition {
                from: Pending,
                to: Paid
            }
        ));
    }

    #[test]
    fn release_side_effects() {
        assert!(Rejected.releases_inventory());
        assert!(Cancelled.releases_inventory());
        assert!(!Accepted.releases_inventory());
        assert!(!Paid.releases_inventory());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = BookingEvent::AdvertisedChanged {
            listing_id: Uuid::nil(),
            advertised: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AdvertisedChanged");
        assert_eq!(event.listing_id(), Uuid::nil());
    }
}
