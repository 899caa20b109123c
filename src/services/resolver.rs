//! Avatar resolution
//!
//! Orchestrates the version guard, the user directory, and the optimized
//! store into a single decision: serve a local file, redirect, proxy a
//! remote image, or fall back to blank. Nothing on this path is allowed to
//! fail loudly; any absorbed error resolves to [`ResolvedImage::Blank`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::Config;
use crate::errors::{ResolveError, ResolveResult};
use crate::models::{
    local_avatar_url, AvatarRequest, ImageOrigin, ResolvedImage, RedirectKind, Upload, User,
};
use crate::services::optimized::{OptimizedImage, OptimizedImageStore};
use crate::services::directory::UserDirectory;
use crate::services::version::VersionGuard;

/// Per-request snapshot of the site-level switches the resolver consults.
/// Passed in explicitly; the resolver never reads ambient global state.
#[derive(Debug, Clone)]
pub struct AvatarSettings {
    pub base_url: String,
    pub sizes: Vec<u32>,
    pub redirect_avatar_requests: bool,
}

impl From<&Config> for AvatarSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.web.base_url.clone(),
            sizes: config.avatars.sizes.clone(),
            redirect_avatar_requests: config.avatars.redirect_avatar_requests,
        }
    }
}

pub struct AvatarResolver {
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn OptimizedImageStore>,
    settings: AvatarSettings,
}

impl AvatarResolver {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn OptimizedImageStore>,
        settings: AvatarSettings,
    ) -> Self {
        Self {
            directory,
            store,
            settings,
        }
    }

    /// Resolve a request to exactly one serving decision. Never fails: every
    /// absorbed error becomes the blank placeholder.
    pub async fn resolve(&self, request: &AvatarRequest) -> ResolvedImage {
        match self.try_resolve(request).await {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!(
                    tenant = %request.tenant,
                    username = %request.username,
                    "avatar request degraded to blank: {err}"
                );
                ResolvedImage::Blank
            }
        }
    }

    async fn try_resolve(&self, request: &AvatarRequest) -> ResolveResult<ResolvedImage> {
        let parsed = VersionGuard::validate(&request.version_param, request.size)?;

        let username_lower = request.username.to_lowercase();
        let encoded_username = urlencoding::encode(&username_lower).into_owned();

        // A non-canonical size against an external store would mint a brand
        // new remote variant per request; redirect to the nearest canonical
        // size instead so the set of cached variants stays bounded. With no
        // configured sizes there is nothing to redirect to, so every size is
        // served directly rather than bounced back at itself.
        if !self.settings.sizes.is_empty()
            && !self.settings.sizes.contains(&request.size)
            && self.store.is_external()
        {
            let closest = Self::closest_size(&self.settings.sizes, request.size);
            let url = local_avatar_url(
                &self.settings.base_url,
                &request.tenant,
                &encoded_username,
                parsed.upload_id,
                closest,
            );
            return Ok(ResolvedImage::Redirect {
                url,
                kind: RedirectKind::App,
            });
        }

        let user = self
            .directory
            .find_user(&request.tenant, &username_lower)
            .await
            .ok_or_else(|| ResolveError::UnknownUser {
                username: username_lower.clone(),
            })?;

        let upload = match self.resolve_upload(&request.tenant, &user, parsed.upload_id).await {
            Some(upload) => upload,
            None => {
                // A stale link: the user changed avatars since it was shared.
                // Repair it by redirecting to their current avatar.
                if let Some(current) = self.current_upload(&request.tenant, &user).await {
                    if current.id != parsed.upload_id {
                        let url = local_avatar_url(
                            &self.settings.base_url,
                            &request.tenant,
                            &encoded_username,
                            current.id,
                            request.size,
                        );
                        return Ok(ResolvedImage::Redirect {
                            url,
                            kind: RedirectKind::App,
                        });
                    }
                }
                return Err(ResolveError::UploadOwnershipMismatch {
                    upload_id: parsed.upload_id,
                    user_id: user.id,
                });
            }
        };

        let optimized = self
            .optimized_for(&request.tenant, &upload, request.size)
            .await
            .ok_or(ResolveError::NoOptimizedImage {
                upload_id: upload.id,
            })?;

        match optimized.origin {
            ImageOrigin::Local { path } => match tokio::fs::metadata(&path).await {
                Ok(metadata) => {
                    let last_modified = metadata
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or(upload.created_at);
                    Ok(ResolvedImage::LocalFile {
                        path,
                        last_modified,
                    })
                }
                // Expected but missing: a transient operational condition
                Err(_) => Err(ResolveError::MissingLocalFile { path }),
            },
            ImageOrigin::Remote { url } => {
                let url = self.store.cdn_url(&url);
                if self.settings.redirect_avatar_requests {
                    Ok(ResolvedImage::Redirect {
                        url,
                        kind: RedirectKind::Cdn,
                    })
                } else {
                    Ok(ResolvedImage::Proxy {
                        url,
                        last_modified: upload.created_at,
                    })
                }
            }
        }
    }

    /// The upload the request may serve: one contained in the user's avatar
    /// history, or the user's currently active uploaded avatar.
    async fn resolve_upload(&self, tenant: &str, user: &User, upload_id: i64) -> Option<Upload> {
        if let Some(avatar) = self.directory.user_avatar(tenant, user.id).await {
            if avatar.contains_upload(upload_id) {
                if let Some(upload) = self.directory.find_upload(tenant, upload_id).await {
                    return Some(upload);
                }
            }
        }
        if user.uploaded_avatar_id == Some(upload_id) {
            return self.directory.find_upload(tenant, upload_id).await;
        }
        None
    }

    async fn current_upload(&self, tenant: &str, user: &User) -> Option<Upload> {
        let current_id = user.uploaded_avatar_id?;
        self.directory.find_upload(tenant, current_id).await
    }

    async fn optimized_for(
        &self,
        tenant: &str,
        upload: &Upload,
        size: u32,
    ) -> Option<OptimizedImage> {
        // Vector originals need no raster rendition; serve them as-is
        if upload.is_vector() {
            return Some(OptimizedImage {
                origin: upload.origin.clone(),
            });
        }
        self.store.get_optimized(tenant, upload, size, size).await
    }

    /// Canonical size with minimum absolute distance to `size`; ties break
    /// toward the smaller size.
    fn closest_size(sizes: &[u32], size: u32) -> u32 {
        sizes
            .iter()
            .copied()
            .min_by_key(|candidate| (candidate.abs_diff(size), *candidate))
            .unwrap_or(size)
    }
}
