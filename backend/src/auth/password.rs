//! bcrypt password hashing, run off the async executor

use crate::error::{ServiceError, ServiceResult};

pub async fn hash_password(password: String, cost: u32) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::Internal(format!("hashing task failed: {}", e)))?
        .map_err(|e| ServiceError::Internal(format!("hashing failed: {}", e)))
}

/// `false` for a wrong password or an unparseable hash
pub async fn verify_password(password: String, hash: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| ServiceError::Internal(format!("verification task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify() {
        let hash = hash_password("hunter22".into(), 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("hunter23".into(), hash).await.unwrap());
        assert!(!verify_password("x".into(), "not-a-hash".into()).await.unwrap());
    }
}
