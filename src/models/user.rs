//! User directory models
//!
//! The directory itself is an external collaborator (see
//! `services::directory`); these are the shapes the resolver consumes.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Optional identity used by the gravatar-like refresh
    #[serde(default)]
    pub email: Option<String>,
    /// The currently active uploaded-avatar id, if any
    #[serde(default)]
    pub uploaded_avatar_id: Option<i64>,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    pub fn username_lower(&self) -> String {
        self.username.to_lowercase()
    }

    /// URL-safe lowercase username for building avatar paths
    pub fn encoded_username_lower(&self) -> String {
        urlencoding::encode(&self.username_lower()).into_owned()
    }

    /// Whether this user may edit `target`. Users edit themselves; admins
    /// edit anyone.
    pub fn can_edit(&self, target: &User) -> bool {
        self.id == target.id || self.admin
    }
}

/// A user's avatar record: the uploads their avatar history may serve
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAvatar {
    pub user_id: i64,
    #[serde(default)]
    pub custom_upload_id: Option<i64>,
    #[serde(default)]
    pub gravatar_upload_id: Option<i64>,
}

impl UserAvatar {
    /// Ownership check: does the avatar history contain this upload?
    pub fn contains_upload(&self, upload_id: i64) -> bool {
        self.custom_upload_id == Some(upload_id) || self.gravatar_upload_id == Some(upload_id)
    }
}

/// Where an image's bytes live
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    Local { path: PathBuf },
    Remote { url: String },
}

/// An originally uploaded image
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub extension: String,
    pub created_at: DateTime<Utc>,
    pub origin: ImageOrigin,
}

impl Upload {
    /// Vector uploads need no raster optimization and are served as-is
    pub fn is_vector(&self) -> bool {
        self.extension.eq_ignore_ascii_case("svg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, admin: bool) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: None,
            uploaded_avatar_id: None,
            admin,
        }
    }

    #[test]
    fn test_can_edit() {
        let alice = user(1, false);
        let bob = user(2, false);
        let admin = user(3, true);
        assert!(alice.can_edit(&alice));
        assert!(!alice.can_edit(&bob));
        assert!(admin.can_edit(&alice));
    }

    #[test]
    fn test_contains_upload() {
        let avatar = UserAvatar {
            user_id: 1,
            custom_upload_id: Some(10),
            gravatar_upload_id: Some(11),
        };
        assert!(avatar.contains_upload(10));
        assert!(avatar.contains_upload(11));
        assert!(!avatar.contains_upload(12));
    }

    #[test]
    fn test_encoded_username() {
        let mut u = user(1, false);
        u.username = "Mr Space".to_string();
        assert_eq!(u.encoded_username_lower(), "mr%20space");
    }
}
