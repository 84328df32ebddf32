//! Collaborators the admission pipeline consumes.
//!
//! User storage, access list persistence and password hashing live outside
//! the pipeline. It reaches them only through these traits, so a database
//! backed implementation can replace [`MemoryDirectory`] without touching the
//! admission code.

pub mod memory;
pub mod password;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::security::access_list::AccessList;

pub use memory::MemoryDirectory;
pub use password::{hash_password, BcryptVerifier};

/// Failures of an external collaborator. Callers fail closed on these.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// A console user as the directory knows it.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub roles: BTreeSet<String>,
    pub disabled: bool,
    #[serde(skip)]
    pub password_hash: String,
}

/// Identity and permission facts about console users.
#[async_trait]
pub trait IdentityDirectory: Send + Sync + std::fmt::Debug {
    /// Current roles of an active user, or `None` if the subject is unknown
    /// or disabled.
    async fn lookup_user_roles(&self, subject_id: &str) -> Result<Option<BTreeSet<String>>, DirectoryError>;

    /// Whether the subject holds `permission`.
    async fn lookup_permission(&self, subject_id: &str, permission: &str) -> Result<bool, DirectoryError>;

    async fn find_user(&self, subject_id: &str) -> Result<Option<UserRecord>, DirectoryError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;

    /// Check an email/password pair, returning the user on success.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<UserRecord>, DirectoryError>;
}

/// Persisted access list definitions.
#[async_trait]
pub trait AccessListStore: Send + Sync + std::fmt::Debug {
    async fn fetch_access_list(&self, id: i64) -> Result<Option<AccessList>, DirectoryError>;
}

/// Verifies a plaintext password against a stored hash.
#[async_trait]
pub trait PasswordVerifier: Send + Sync + std::fmt::Debug {
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, DirectoryError>;
}
