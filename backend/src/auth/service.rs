//! Authentication service
//!
//! Registration, login, token authentication and admin account management.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::jwt::{generate_access_token, verify_token, JwtError};
use super::password::{hash_password, verify_password};
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    AuthTokenResponse, Identity, LoginRequest, RegisterRequest, User, UserResponse, UserRole,
};
use crate::store::{Store, StoreError};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Token error: {0}")]
    TokenError(#[from] JwtError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AuthError::UserNotFound,
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for AuthError {
    fn from(e: ServiceError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

/// Settings the auth service needs from configuration
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    /// Lowercased emails that register as admins
    pub admin_emails: Vec<String>,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, settings: AuthSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Create an account and sign it in
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthTokenResponse, AuthError> {
        request
            .validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let role = if self.settings.admin_emails.contains(&email) {
            UserRole::Admin
        } else {
            UserRole::User
        };
        let password_hash = hash_password(request.password, self.settings.bcrypt_cost).await?;

        let now = self.clock.now();
        let user = self
            .store
            .insert_user(User {
                id: Uuid::new_v4(),
                email,
                name: request.name.trim().to_string(),
                photo_url: request.photo_url,
                password_hash,
                role,
                fraud: false,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        self.issue_token(user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthTokenResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(request.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "User logged in");
        self.issue_token(user)
    }

    /// Resolve a bearer token to the current user row
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = verify_token(token, &self.settings.jwt_secret)?;
        let user_id = claims.user_id()?;
        Ok(self.store.get_user(user_id).await?)
    }

    fn issue_token(&self, user: User) -> Result<AuthTokenResponse, AuthError> {
        let access_token = generate_access_token(
            &user,
            &self.settings.jwt_secret,
            self.settings.access_token_ttl_seconds,
            self.clock.now(),
        )?;

        Ok(AuthTokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_ttl_seconds,
            user: user.into(),
        })
    }

    pub async fn list_users(&self, actor: &Identity) -> ServiceResult<Vec<UserResponse>> {
        actor.require_role(UserRole::Admin)?;
        Ok(self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(UserResponse::from)
            .collect())
    }

    /// Takes effect on the target's next request
    pub async fn set_role(&self, actor: &Identity, id: Uuid, role: UserRole) -> ServiceResult<UserResponse> {
        actor.require_role(UserRole::Admin)?;
        if id == actor.user_id {
            return Err(ServiceError::Forbidden(
                "Admins cannot change their own role".into(),
            ));
        }

        let user = self.store.set_user_role(id, role, self.clock.now()).await?;
        tracing::info!(user_id = %id, role = %role, by = %actor.user_id, "Role changed");
        Ok(user.into())
    }

    /// Flag a vendor as fraud; their listings leave the public catalogue
    pub async fn set_fraud(&self, actor: &Identity, id: Uuid, fraud: bool) -> ServiceResult<UserResponse> {
        actor.require_role(UserRole::Admin)?;
        let target = self.store.get_user(id).await?;
        if target.role != UserRole::Vendor {
            return Err(ServiceError::Validation(
                "Only vendors can be flagged as fraud".into(),
            ));
        }

        let user = self.store.set_user_fraud(id, fraud, self.clock.now()).await?;
        tracing::warn!(vendor_id = %id, fraud, by = %actor.user_id, "Vendor fraud flag changed");
        Ok(user.into())
    }

    pub async fn delete_user(&self, actor: &Identity, id: Uuid) -> ServiceResult<()> {
        actor.require_role(UserRole::Admin)?;
        if id == actor.user_id {
            return Err(ServiceError::Forbidden(
                "Admins cannot delete their own account".into(),
            ));
        }

        self.store.delete_user(id, self.clock.now()).await?;
        tracing::info!(user_id = %id, by = %actor.user_id, "User deleted");
        Ok(())
    }
}
