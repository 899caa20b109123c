//! Optimized-image store collaborator
//!
//! The resizing pipeline itself lives elsewhere; the resolver only asks the
//! store where the optimized rendition of an upload at a given pixel size
//! would be. A local store answers with a filesystem path (which may not
//! exist yet), a remote store with a URL.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::models::{ImageOrigin, Upload};
use crate::utils::UrlUtils;

/// An optimized rendition of an upload
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub origin: ImageOrigin,
}

#[async_trait]
pub trait OptimizedImageStore: Send + Sync {
    /// Whether renditions live outside this host. External stores bound the
    /// set of generated variants to the canonical size list.
    fn is_external(&self) -> bool;

    /// The rendition of `upload` at `width` x `height`, if obtainable
    async fn get_optimized(
        &self,
        tenant: &str,
        upload: &Upload,
        width: u32,
        height: u32,
    ) -> Option<OptimizedImage>;

    /// Public URL for a remotely stored rendition, with the CDN prefix applied
    fn cdn_url(&self, url: &str) -> String;
}

/// Renditions stored on local disk under a fixed directory layout
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Where the rendition of `upload_id` at `width` x `height` lives
    pub fn optimized_path(
        &self,
        tenant: &str,
        upload_id: i64,
        width: u32,
        height: u32,
        extension: &str,
    ) -> PathBuf {
        self.root
            .join(tenant)
            .join(format!("{upload_id}_{width}x{height}.{extension}"))
    }
}

#[async_trait]
impl OptimizedImageStore for LocalImageStore {
    fn is_external(&self) -> bool {
        false
    }

    async fn get_optimized(
        &self,
        tenant: &str,
        upload: &Upload,
        width: u32,
        height: u32,
    ) -> Option<OptimizedImage> {
        // For vector originals the caller bypasses the store entirely; for
        // raster ones the rendition path is deterministic. Existence is the
        // resolver's concern.
        Some(OptimizedImage {
            origin: ImageOrigin::Local {
                path: self.optimized_path(tenant, upload.id, width, height, &upload.extension),
            },
        })
    }

    fn cdn_url(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Renditions stored on a remote origin (object storage behind a CDN)
pub struct RemoteImageStore {
    cdn_base_url: Option<String>,
    force_https: bool,
}

impl RemoteImageStore {
    pub fn new(cdn_base_url: Option<String>, force_https: bool) -> Self {
        Self {
            cdn_base_url,
            force_https,
        }
    }

    /// Derive the rendition URL from the upload's source URL by suffixing the
    /// pixel dimensions onto the file stem.
    fn rendition_url(url: &str, width: u32, height: u32) -> String {
        match url.rfind('.') {
            Some(dot) if url[dot..].len() <= 6 => {
                format!("{}_{}x{}{}", &url[..dot], width, height, &url[dot..])
            }
            _ => format!("{url}_{width}x{height}"),
        }
    }
}

#[async_trait]
impl OptimizedImageStore for RemoteImageStore {
    fn is_external(&self) -> bool {
        true
    }

    async fn get_optimized(
        &self,
        _tenant: &str,
        upload: &Upload,
        width: u32,
        height: u32,
    ) -> Option<OptimizedImage> {
        match &upload.origin {
            ImageOrigin::Remote { url } => Some(OptimizedImage {
                origin: ImageOrigin::Remote {
                    url: Self::rendition_url(url, width, height),
                },
            }),
            // An upload whose bytes never left this host has no remote rendition
            ImageOrigin::Local { .. } => None,
        }
    }

    fn cdn_url(&self, url: &str) -> String {
        let url = UrlUtils::upgrade_scheme_relative(url, self.force_https);
        match &self.cdn_base_url {
            Some(cdn) => match url::Url::parse(&url) {
                Ok(parsed) => {
                    let mut rebased = format!("{}{}", cdn.trim_end_matches('/'), parsed.path());
                    if let Some(query) = parsed.query() {
                        rebased.push('?');
                        rebased.push_str(query);
                    }
                    rebased
                }
                Err(_) => url,
            },
            None => url,
        }
    }
}
