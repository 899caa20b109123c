//! User directory collaborator
//!
//! The resolver needs user, avatar-record, and upload lookups per tenant.
//! The trait is the seam; the in-memory implementation backs the standalone
//! binary (seedable from JSON) and the tests. Lookups are keyed by tenant
//! hostname, threaded explicitly through every call.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use crate::models::{Upload, User, UserAvatar};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Case-insensitive user lookup; callers pass the already-lowercased name
    async fn find_user(&self, tenant: &str, username_lower: &str) -> Option<User>;

    async fn user_avatar(&self, tenant: &str, user_id: i64) -> Option<UserAvatar>;

    /// Get the user's avatar record, creating an empty one if absent
    async fn ensure_user_avatar(&self, tenant: &str, user_id: i64) -> UserAvatar;

    async fn find_upload(&self, tenant: &str, upload_id: i64) -> Option<Upload>;

    /// Register a new upload, returning its assigned id
    async fn register_upload(&self, tenant: &str, upload: Upload) -> i64;

    /// Point the user's gravatar-sourced avatar at `upload_id` (or clear it)
    async fn set_gravatar_upload(&self, tenant: &str, user_id: i64, upload_id: Option<i64>);
}

#[derive(Default)]
struct TenantData {
    users: HashMap<i64, User>,
    users_by_name: HashMap<String, i64>,
    avatars: HashMap<i64, UserAvatar>,
    uploads: HashMap<i64, Upload>,
    next_upload_id: i64,
}

/// In-memory, per-tenant user directory
#[derive(Default)]
pub struct InMemoryDirectory {
    tenants: RwLock<HashMap<String, TenantData>>,
}

/// JSON seed format for the in-memory directory
#[derive(Debug, Deserialize)]
pub struct DirectorySeed {
    pub tenants: HashMap<String, TenantSeed>,
}

#[derive(Debug, Deserialize)]
pub struct TenantSeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub avatars: Vec<UserAvatar>,
    #[serde(default)]
    pub uploads: Vec<Upload>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a directory from a JSON seed file
    pub async fn from_seed_file(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let seed: DirectorySeed = serde_json::from_str(&contents)?;
        let directory = Self::new();
        for (tenant, data) in seed.tenants {
            for user in data.users {
                directory.add_user(&tenant, user).await;
            }
            for avatar in data.avatars {
                directory.add_avatar(&tenant, avatar).await;
            }
            for upload in data.uploads {
                directory.add_upload(&tenant, upload).await;
            }
        }
        Ok(directory)
    }

    pub async fn add_user(&self, tenant: &str, user: User) {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        data.users_by_name.insert(user.username_lower(), user.id);
        data.users.insert(user.id, user);
    }

    pub async fn add_avatar(&self, tenant: &str, avatar: UserAvatar) {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        data.avatars.insert(avatar.user_id, avatar);
    }

    /// Insert an upload with a caller-chosen id (seeding and tests)
    pub async fn add_upload(&self, tenant: &str, upload: Upload) {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        data.next_upload_id = data.next_upload_id.max(upload.id + 1);
        data.uploads.insert(upload.id, upload);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_user(&self, tenant: &str, username_lower: &str) -> Option<User> {
        let tenants = self.tenants.read().await;
        let data = tenants.get(tenant)?;
        let id = data.users_by_name.get(username_lower)?;
        data.users.get(id).cloned()
    }

    async fn user_avatar(&self, tenant: &str, user_id: i64) -> Option<UserAvatar> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant)?.avatars.get(&user_id).cloned()
    }

    async fn ensure_user_avatar(&self, tenant: &str, user_id: i64) -> UserAvatar {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        data.avatars
            .entry(user_id)
            .or_insert_with(|| UserAvatar {
                user_id,
                ..UserAvatar::default()
            })
            .clone()
    }

    async fn find_upload(&self, tenant: &str, upload_id: i64) -> Option<Upload> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant)?.uploads.get(&upload_id).cloned()
    }

    async fn register_upload(&self, tenant: &str, mut upload: Upload) -> i64 {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        data.next_upload_id = data.next_upload_id.max(1);
        upload.id = data.next_upload_id;
        data.next_upload_id += 1;
        let id = upload.id;
        data.uploads.insert(id, upload);
        id
    }

    async fn set_gravatar_upload(&self, tenant: &str, user_id: i64, upload_id: Option<i64>) {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        let avatar = data.avatars.entry(user_id).or_insert_with(|| UserAvatar {
            user_id,
            ..UserAvatar::default()
        });
        avatar.gravatar_upload_id = upload_id;
    }
}
