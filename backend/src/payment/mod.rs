//! Payment module
//!
//! Checkout sessions at an external gateway and idempotent capture
//! confirmation, via the purchaser redirect or a signed webhook.

pub mod gateway;
pub mod model;
pub mod service;
pub mod webhook;

pub use gateway::{GatewayError, HttpGateway, PaymentGateway, SimulatedGateway};
pub use model::*;
pub use service::{CheckoutSettings, PaymentService};
