//! Booking module
//!
//! Reservation against the seat ledger and the booking state machine.

pub mod expiry;
pub mod model;
pub mod service;

pub use model::*;
pub use service::{BookingService, TransitionOutcome};
