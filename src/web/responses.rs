//! HTTP response construction for image serving
//!
//! Turns a [`ResolvedImage`] into a concrete response. Every successful image
//! response carries Last-Modified and Content-Length; Cache-Control is one of
//! three fixed values so caches can tell real content (cacheable forever),
//! CDN redirects (medium-lived), and the blank placeholder (short-lived,
//! self-healing) apart.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::assets::ImageAssets;
use crate::errors::AppError;
use crate::models::{RedirectKind, ResolvedImage};
use crate::services::ProxyCache;

/// Resolved local or proxied real content: cacheable forever
pub const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";
/// Blank placeholder: short-lived so transient failures self-heal
pub const CACHE_BLANK: &str = "public, max-age=600";
/// Redirect to a remote CDN
pub const CACHE_CDN_REDIRECT: &str = "public, max-age=3600, immutable, stale-while-revalidate=86400";

/// Fixed Last-Modified for placeholder responses, far enough in the past to
/// read as "not real content" to any cache-aware client
pub fn blank_sentinel() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()
}

fn httpdate(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn image_headers(
    content_type: &'static str,
    content_length: u64,
    last_modified: DateTime<Utc>,
    cache_control: &'static str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    headers.insert(header::CONTENT_LENGTH, content_length.into());
    headers.insert(
        header::LAST_MODIFIED,
        httpdate(last_modified).parse().unwrap(),
    );
    headers.insert(header::CACHE_CONTROL, cache_control.parse().unwrap());
    headers
}

/// Serve bytes from a local path with the 1-year immutable directive
pub async fn serve_file(path: &Path, last_modified: DateTime<Utc>) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("failed to read {}: {err}", path.display());
            return render_blank();
        }
    };
    let content_type = ImageAssets::get_content_type(&path.to_string_lossy());
    let headers = image_headers(
        content_type,
        bytes.len() as u64,
        last_modified,
        CACHE_IMMUTABLE,
    );
    (StatusCode::OK, headers, bytes).into_response()
}

/// The universal safety net: always succeeds, never cacheable for long
pub fn render_blank() -> Response {
    let bytes = ImageAssets::blank_avatar();
    let headers = image_headers(
        "image/png",
        bytes.len() as u64,
        blank_sentinel(),
        CACHE_BLANK,
    );
    (StatusCode::OK, headers, bytes.into_owned()).into_response()
}

/// 302 redirect; cross-origin targets are permitted by design since avatar
/// CDNs commonly live on a different host than the application
pub fn redirect(url: &str, kind: RedirectKind) -> Response {
    let mut headers = HeaderMap::new();
    let location = match url.parse() {
        Ok(location) => location,
        Err(_) => return render_blank(),
    };
    headers.insert(header::LOCATION, location);
    if kind == RedirectKind::Cdn {
        headers.insert(header::CACHE_CONTROL, CACHE_CDN_REDIRECT.parse().unwrap());
    }
    (StatusCode::FOUND, headers).into_response()
}

/// Finalize a resolver decision into a response. Proxy decisions are fetched
/// through the cache and served like local files, stamped with the originally
/// supplied last-modified; a failed fetch degrades to blank.
pub async fn build_image_response(proxy_cache: &ProxyCache, resolved: ResolvedImage) -> Response {
    match resolved {
        ResolvedImage::LocalFile {
            path,
            last_modified,
        } => serve_file(&path, last_modified).await,
        ResolvedImage::Redirect { url, kind } => redirect(&url, kind),
        ResolvedImage::Proxy { url, last_modified } => match proxy_cache.fetch(&url).await {
            Ok(path) => serve_file(&path, last_modified).await,
            Err(err) => {
                debug!("proxy fetch failed for {url}: {err}");
                render_blank()
            }
        },
        ResolvedImage::Blank => render_blank(),
    }
}

/// Standard error body for the JSON endpoints. Successful JSON responses
/// carry their payload directly, so only the failure shape is wrapped.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiResponse {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            error: message,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Convert AppError to the appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message) = match &error {
        AppError::UserNotFound { username } => (
            StatusCode::NOT_FOUND,
            format!("user '{username}' not found"),
        ),
        AppError::PermissionDenied { action, resource } => (
            StatusCode::FORBIDDEN,
            format!("permission denied: {action} on {resource}"),
        ),
        AppError::ConfigDisabled { .. } => (StatusCode::NOT_FOUND, "not found".to_string()),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("configuration error: {message}"),
        ),
        AppError::Http(_) => (
            StatusCode::BAD_GATEWAY,
            "external service communication failed".to_string(),
        ),
        AppError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal error: {message}"),
        ),
    };

    (status, Json(ApiResponse::error(message))).into_response()
}
