//! TicketHub Backend Library
//!
//! Ticket marketplace backend: vendor listings with a seat ledger, the
//! booking state machine, advertisement slots and gateway payments.

pub mod auth;
pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod listing;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;
