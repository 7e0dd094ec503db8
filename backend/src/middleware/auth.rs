//! Authentication extractors
//!
//! Bearer tokens are verified and resolved to the current user row, so role
//! and fraud changes apply on the next request.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{AuthError, AuthService, JwtError};
use crate::models::{Identity, User};

/// Authenticated user extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub identity: Identity,
}

/// Error body for authentication failures
#[derive(Debug, Serialize)]
struct AuthRejection {
    error: AuthRejectionDetails,
}

#[derive(Debug, Serialize)]
struct AuthRejectionDetails {
    code: &'static str,
    message: &'static str,
}

impl AuthRejection {
    fn new(code: &'static str, message: &'static str) -> Self {
        Self {
            error: AuthRejectionDetails { code, message },
        }
    }

    fn from_auth_error(e: &AuthError) -> Self {
        match e {
            AuthError::TokenError(JwtError::TokenExpired) => {
                Self::new("TOKEN_EXPIRED", "Token has expired")
            }
            AuthError::UserNotFound => {
                Self::new("USER_NOT_FOUND", "The account for this token no longer exists")
            }
            _ => Self::new("INVALID_TOKEN", "Invalid token"),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Extractor for authenticated users
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.user.name)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthRejection::new(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let user = auth_service
            .authenticate(bearer.token())
            .await
            .map_err(|e| {
                if let AuthError::Internal(message) = &e {
                    tracing::error!(error = %message, "Token authentication failed");
                } else {
                    tracing::debug!(error = %e, "Token rejected");
                }
                AuthRejection::from_auth_error(&e).into_response()
            })?;

        Ok(AuthenticatedUser {
            identity: user.identity(),
            user,
        })
    }
}

/// Optional authenticated user extractor
///
/// Never rejects: a missing or bad token yields `None`.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

impl OptionalUser {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref().map(|u| &u.identity)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(_) => Ok(OptionalUser(None)),
        }
    }
}
