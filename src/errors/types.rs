//! Error type definitions for the avatar proxy

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error type
///
/// These errors escape to the HTTP layer. Everything that happens during
/// public image resolution is a [`ResolveError`] instead and never surfaces.
#[derive(Error, Debug)]
pub enum AppError {
    /// The target user of an authenticated mutation does not exist
    #[error("User not found: {username}")]
    UserNotFound { username: String },

    /// The acting user may not perform the action on the target
    #[error("Permission denied: {action} on {resource}")]
    PermissionDenied { action: String, resource: String },

    /// A route whose site-level configuration gate does not match
    #[error("Route disabled by configuration: {setting}")]
    ConfigDisabled { setting: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn user_not_found<S: Into<String>>(username: S) -> Self {
        Self::UserNotFound {
            username: username.into(),
        }
    }

    pub fn permission_denied<A: Into<String>, R: Into<String>>(action: A, resource: R) -> Self {
        Self::PermissionDenied {
            action: action.into(),
            resource: resource.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Absorbed resolution errors
///
/// Every variant resolves to the blank placeholder; the variants exist so the
/// debug log says why a request degraded.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The optimized-image version token is newer than this service understands
    #[error("version mismatch: requested {requested}, supported {supported}")]
    VersionMismatch { requested: i32, supported: i32 },

    /// Requested pixel size outside the supported bounds
    #[error("size out of range: {size}")]
    SizeOutOfRange { size: u32 },

    /// The upload id in the version token is not a positive integer
    #[error("invalid upload id in version token '{token}'")]
    InvalidUploadId { token: String },

    /// No user with that username on this tenant
    #[error("unknown user '{username}'")]
    UnknownUser { username: String },

    /// The upload id does not belong to the user's avatar history or current avatar
    #[error("upload {upload_id} is not owned by user {user_id}")]
    UploadOwnershipMismatch { upload_id: i64, user_id: i64 },

    /// No optimized rendition could be obtained for the upload
    #[error("no optimized image for upload {upload_id}")]
    NoOptimizedImage { upload_id: i64 },

    /// A rendition the store says is local is not on disk
    #[error("missing local file: {path}")]
    MissingLocalFile { path: PathBuf },
}

/// Proxy cache download failures
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Request-level failures (connect, timeout, TLS, redirect loop)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status from the remote source
    #[error("http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Response body exceeded the configured maximum
    #[error("response larger than {limit} bytes from {url}")]
    TooLarge { limit: u64, url: String },

    /// Filesystem failures while staging or promoting the cache file
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Atomic promotion of the temp file failed
    #[error("failed to promote temp file: {0}")]
    Persist(#[from] tempfile::PathPersistError),
}
