//! Bcrypt password verification.

use async_trait::async_trait;

use crate::directory::{DirectoryError, PasswordVerifier};

/// Bcrypt cost used when the config does not override it.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hash a password on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, DirectoryError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, cost).map_err(|e| DirectoryError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| DirectoryError::Hashing(format!("task join error: {}", e)))?
}

/// [`PasswordVerifier`] backed by bcrypt. Verification runs on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptVerifier;

#[async_trait]
impl PasswordVerifier for BcryptVerifier {
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, DirectoryError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || match bcrypt::verify(password, &hash) {
            Ok(matched) => Ok(matched),
            // A corrupt stored hash is a mismatch, not an outage.
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be verified");
                Ok(false)
            }
        })
        .await
        .map_err(|e| DirectoryError::Hashing(format!("task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("changeme", 4).await.unwrap();
        assert!(BcryptVerifier.verify("changeme", &hash).await.unwrap());
        assert!(!BcryptVerifier.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_is_a_mismatch() {
        assert!(!BcryptVerifier.verify("changeme", "not-a-hash").await.unwrap());
    }
}
