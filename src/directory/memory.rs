//! In-memory directory used by the standalone console and in tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::directory::{
    AccessListStore, BcryptVerifier, DirectoryError, IdentityDirectory, PasswordVerifier, UserRecord,
};
use crate::security::access_list::AccessList;

/// A thread-safe user, permission and access list store.
///
/// Cloning is cheap; clones share the same maps.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    users: Arc<DashMap<String, UserRecord>>,
    permissions: Arc<DashMap<String, HashSet<String>>>,
    access_lists: Arc<DashMap<i64, AccessList>>,
    verifier: Arc<dyn PasswordVerifier>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new(Arc::new(BcryptVerifier))
    }
}

impl MemoryDirectory {
    pub fn new(verifier: Arc<dyn PasswordVerifier>) -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            permissions: Arc::new(DashMap::new()),
            access_lists: Arc::new(DashMap::new()),
            verifier,
        }
    }

    /// Insert or replace a user.
    pub fn upsert_user(&self, user: UserRecord) {
        tracing::debug!(user_id = %user.id, email = %user.email, "Directory user stored");
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove_user(&self, subject_id: &str) -> Option<UserRecord> {
        self.permissions.remove(subject_id);
        self.users.remove(subject_id).map(|(_, user)| user)
    }

    pub fn set_disabled(&self, subject_id: &str, disabled: bool) {
        if let Some(mut user) = self.users.get_mut(subject_id) {
            user.disabled = disabled;
        }
    }

    pub fn grant_permission(&self, subject_id: &str, permission: &str) {
        self.permissions
            .entry(subject_id.to_string())
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke_permission(&self, subject_id: &str, permission: &str) {
        if let Some(mut granted) = self.permissions.get_mut(subject_id) {
            granted.remove(permission);
        }
    }

    pub fn put_access_list(&self, list: AccessList) {
        self.access_lists.insert(list.id, list);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn access_list_count(&self) -> usize {
        self.access_lists.len()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn lookup_user_roles(&self, subject_id: &str) -> Result<Option<BTreeSet<String>>, DirectoryError> {
        Ok(self
            .users
            .get(subject_id)
            .filter(|u| !u.disabled)
            .map(|u| u.roles.clone()))
    }

    async fn lookup_permission(&self, subject_id: &str, permission: &str) -> Result<bool, DirectoryError> {
        Ok(self
            .permissions
            .get(subject_id)
            .map(|granted| granted.contains(permission))
            .unwrap_or(false))
    }

    async fn find_user(&self, subject_id: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.users.get(subject_id).map(|u| u.value().clone()))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let mut users: Vec<UserRecord> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<UserRecord>, DirectoryError> {
        // Clone out of the map so no shard lock is held across the await.
        let user = self
            .users
            .iter()
            .find(|r| r.value().email.eq_ignore_ascii_case(email))
            .map(|r| r.value().clone());

        let Some(user) = user.filter(|u| !u.disabled) else {
            return Ok(None);
        };

        if self.verifier.verify(password, &user.password_hash).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl AccessListStore for MemoryDirectory {
    async fn fetch_access_list(&self, id: i64) -> Result<Option<AccessList>, DirectoryError> {
        Ok(self.access_lists.get(&id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::hash_password;

    async fn user(id: &str, roles: &[&str]) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            disabled: false,
            password_hash: hash_password("changeme", 4).await.unwrap(),
        }
    }

    #[tokio::test]
    async fn disabled_users_have_no_roles() {
        let dir = MemoryDirectory::default();
        dir.upsert_user(user("1", &["admin"]).await);

        assert!(dir.lookup_user_roles("1").await.unwrap().unwrap().contains("admin"));
        dir.set_disabled("1", true);
        assert!(dir.lookup_user_roles("1").await.unwrap().is_none());
        assert!(dir.lookup_user_roles("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permissions_can_be_granted_and_revoked() {
        let dir = MemoryDirectory::default();
        dir.grant_permission("1", "certificates.manage");
        assert!(dir.lookup_permission("1", "certificates.manage").await.unwrap());
        assert!(!dir.lookup_permission("2", "certificates.manage").await.unwrap());

        dir.revoke_permission("1", "certificates.manage");
        assert!(!dir.lookup_permission("1", "certificates.manage").await.unwrap());
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_email_case() {
        let dir = MemoryDirectory::default();
        dir.upsert_user(user("1", &[]).await);

        assert!(dir.authenticate("1@EXAMPLE.com", "changeme").await.unwrap().is_some());
        assert!(dir.authenticate("1@example.com", "nope").await.unwrap().is_none());
        assert!(dir.authenticate("2@example.com", "changeme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn access_lists_round_trip_through_store() {
        let dir = MemoryDirectory::default();
        dir.put_access_list(AccessList::new(5, "1", vec![]));
        assert_eq!(dir.fetch_access_list(5).await.unwrap().unwrap().owner_id, "1");
        assert!(dir.fetch_access_list(6).await.unwrap().is_none());
    }
}
