//! Listing module
//!
//! Vendor listings, admin verification, the public catalogue and the
//! advertisement slot allocator.

pub mod model;
pub mod service;

pub use model::*;
pub use service::ListingService;
