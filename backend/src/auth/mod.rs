//! Authentication module for TicketHub
//!
//! - Email/password registration and login (bcrypt)
//! - JWT access tokens (HS256)
//! - Admin account management: roles, vendor fraud flag, deletion

mod jwt;
mod password;
mod service;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use password::{hash_password, verify_password};
pub use service::{AuthError, AuthService, AuthSettings};
