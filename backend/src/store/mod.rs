//! Persistence layer
//!
//! [`Store`] is the only way services touch state. [`PgStore`] backs the
//! server; [`MemoryStore`] serves tests and `STORAGE=memory` runs. Both
//! implement every operation with the same atomicity:
//!
//! * reserving seats and inserting the pending booking is one unit, guarded
//!   by `remaining >= quantity`;
//! * a booking transition is written only at the expected version and
//!   status, and a releasing transition restores seats in the same unit;
//! * advertise toggles are serialized so the cap cannot be exceeded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::booking::{Booking, BookingFilter, BookingTransition};
use crate::error::ServiceError;
use crate::listing::{Listing, ListingChanges, ListingFilter, ListingPage, Locations, VerificationStatus};
use crate::models::{User, UserRole};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: i32, remaining: i32 },

    #[error("Advertisement slot limit of {cap} reached")]
    SlotLimitReached { cap: u32 },

    #[error("Listing departed at {departure_at}")]
    Departed { departure_at: DateTime<Utc> },

    #[error("Record was modified concurrently")]
    VersionConflict,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what.to_string()),
            StoreError::InsufficientInventory {
                requested,
                remaining,
            } => ServiceError::InsufficientInventory {
                requested,
                remaining,
            },
            StoreError::SlotLimitReached { cap } => ServiceError::SlotLimitReached { cap },
            StoreError::Departed { departure_at } => ServiceError::ExpiredListing { departure_at },
            StoreError::VersionConflict => {
                ServiceError::Conflict("Record was modified concurrently, retry".to_string())
            }
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Invalid(msg) => ServiceError::Validation(msg),
            StoreError::Database(e) => ServiceError::Storage(e.to_string()),
        }
    }
}

/// Seats requested by a purchaser
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub listing_id: Uuid,
    pub purchaser_id: Uuid,
    pub quantity: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check for `/health`
    async fn ping(&self) -> StoreResult<()>;

    // users

    /// Fails with `Conflict` when the email is taken
    async fn insert_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, id: Uuid) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn set_user_role(&self, id: Uuid, role: UserRole, at: DateTime<Utc>) -> StoreResult<User>;
    async fn set_user_fraud(&self, id: Uuid, fraud: bool, at: DateTime<Utc>) -> StoreResult<User>;
    /// Removes the account with its listings and its purchases. Refused while
    /// anyone holds an open booking on the account's listings.
    async fn delete_user(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    // listings

    async fn insert_listing(&self, listing: Listing) -> StoreResult<Listing>;
    async fn get_listing(&self, id: Uuid) -> StoreResult<Listing>;
    /// Approved, undeparted listings of vendors not flagged as fraud
    async fn search_listings(&self, filter: &ListingFilter, now: DateTime<Utc>) -> StoreResult<ListingPage>;
    async fn listing_locations(&self, now: DateTime<Utc>) -> StoreResult<Locations>;
    async fn advertised_listings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Listing>>;
    async fn listings_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>>;
    async fn all_listings(&self) -> StoreResult<Vec<Listing>>;
    /// Applies `changes`; a new total shifts remaining seats by the same
    /// delta and a rejected listing goes back to pending review
    async fn update_listing(&self, id: Uuid, changes: ListingChanges, at: DateTime<Utc>) -> StoreResult<Listing>;
    /// Refused with `Conflict` while pending or accepted bookings exist
    async fn delete_listing(&self, id: Uuid) -> StoreResult<Listing>;
    /// Rejecting clears the advertised flag
    async fn set_verification(&self, id: Uuid, status: VerificationStatus, at: DateTime<Utc>) -> StoreResult<Listing>;
    /// Serialized toggle; advertising counts only listed (approved and
    /// undeparted) listings against `cap`
    async fn set_advertised(&self, id: Uuid, advertised: bool, cap: u32, now: DateTime<Utc>) -> StoreResult<Listing>;

    // bookings

    /// Decrement remaining seats and insert the pending booking atomically
    async fn reserve_booking(&self, request: ReservationRequest, now: DateTime<Utc>) -> StoreResult<Booking>;
    async fn get_booking(&self, id: Uuid) -> StoreResult<Booking>;
    /// Newest first
    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;
    /// `VersionConflict` when the booking moved since it was read
    async fn apply_transition(&self, transition: &BookingTransition) -> StoreResult<Booking>;
    /// Record the checkout session on an accepted booking at `expected_version`
    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        expected_version: i32,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking>;
}
