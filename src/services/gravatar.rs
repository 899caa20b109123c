//! Gravatar-like avatar-by-identity source
//!
//! The refresh route triggers a lookup against an external image-by-email
//! service and records the result in the user's avatar history. Unlike the
//! public serving paths this is an authenticated mutation, so failures here
//! surface as real errors instead of degrading to blank.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::{ImageOrigin, Upload, User};
use crate::services::directory::UserDirectory;

#[async_trait]
pub trait GravatarSource: Send + Sync {
    /// Re-fetch the user's avatar from the external source. Returns the
    /// upload id now backing the gravatar slot, or `None` when the source has
    /// no image for this identity.
    async fn refresh(&self, tenant: &str, user: &User) -> AppResult<Option<i64>>;
}

/// HTTP client for a gravatar-compatible endpoint
pub struct GravatarClient {
    http_client: Client,
    base_url: String,
    directory: Arc<dyn UserDirectory>,
}

impl GravatarClient {
    pub fn new(
        base_url: String,
        read_timeout: Duration,
        directory: Arc<dyn UserDirectory>,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(read_timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self {
            http_client,
            base_url,
            directory,
        })
    }

    /// Identity hash the source is keyed by
    fn identity_hash(email: &str) -> String {
        let digest = md5::compute(email.trim().to_lowercase().as_bytes());
        format!("{digest:x}")
    }

    fn avatar_url(&self, email: &str) -> String {
        format!(
            "{}/avatar/{}.png?s=360&d=404",
            self.base_url.trim_end_matches('/'),
            Self::identity_hash(email)
        )
    }
}

#[async_trait]
impl GravatarSource for GravatarClient {
    async fn refresh(&self, tenant: &str, user: &User) -> AppResult<Option<i64>> {
        let Some(email) = user.email.as_deref() else {
            // No identity to look up; clear any previous source-backed avatar
            self.directory
                .set_gravatar_upload(tenant, user.id, None)
                .await;
            return Ok(None);
        };

        let url = self.avatar_url(email);
        let response = self.http_client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(user_id = user.id, "no upstream avatar for identity");
            self.directory
                .set_gravatar_upload(tenant, user.id, None)
                .await;
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "avatar source returned HTTP {}",
                response.status()
            )));
        }

        // The source serves the image at this URL from now on; record it as a
        // remote upload and point the gravatar slot at it.
        let upload = Upload {
            id: 0,
            extension: "png".to_string(),
            created_at: chrono::Utc::now(),
            origin: ImageOrigin::Remote { url },
        };
        let upload_id = self.directory.register_upload(tenant, upload).await;
        self.directory
            .set_gravatar_upload(tenant, user.id, Some(upload_id))
            .await;

        Ok(Some(upload_id))
    }
}
