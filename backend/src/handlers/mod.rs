//! API handlers for the TicketHub backend

pub mod auth;
pub mod booking;
pub mod health;
pub mod listing;
pub mod payment;
pub mod stats;
pub mod user;

pub use crate::middleware::auth::{AuthenticatedUser, OptionalUser};
