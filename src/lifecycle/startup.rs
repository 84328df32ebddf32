//! Startup seeding.
//!
//! Loads the configured access lists into the store and makes sure the
//! bootstrap administrator exists before the listener opens.

use std::collections::BTreeSet;

use crate::config::ConsoleConfig;
use crate::directory::{hash_password, DirectoryError, MemoryDirectory, UserRecord};

/// Subject id of the seeded administrator.
pub const BOOTSTRAP_ADMIN_ID: &str = "1";

/// Populate `directory` from configuration.
pub async fn seed_directory(config: &ConsoleConfig, directory: &MemoryDirectory) -> Result<(), DirectoryError> {
    for list in &config.access_control.access_lists {
        directory.put_access_list(list.clone());
    }

    let bootstrap = &config.bootstrap;
    if bootstrap.admin_email.is_empty() {
        tracing::info!("No bootstrap administrator configured");
        return Ok(());
    }

    if bootstrap.admin_password == "changeme" {
        tracing::warn!(email = %bootstrap.admin_email, "Bootstrap administrator uses the default password");
    }

    let password_hash = hash_password(&bootstrap.admin_password, config.auth.bcrypt_cost).await?;
    let roles: BTreeSet<String> = [config.auth.admin_role.clone()].into();

    directory.upsert_user(UserRecord {
        id: BOOTSTRAP_ADMIN_ID.to_string(),
        email: bootstrap.admin_email.clone(),
        name: bootstrap.admin_name.clone(),
        roles,
        disabled: false,
        password_hash,
    });

    tracing::info!(
        users = directory.user_count(),
        access_lists = directory.access_list_count(),
        "Directory seeded"
    );
    Ok(())
}
