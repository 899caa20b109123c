//! Request and resolution models for avatar serving

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Currently supported optimized-image format version.
///
/// Tokens carrying an older version are served as current; tokens carrying a
/// newer one are not understood and degrade to blank. Incrementing this
/// invalidates old shared links safely without deleting anything.
pub const OPTIMIZED_IMAGE_VERSION: i32 = 2;

/// A parsed inbound avatar request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct AvatarRequest {
    /// Tenant hostname, threaded explicitly through every resolver call
    pub tenant: String,
    pub username: String,
    /// Compound token: `<upload_id>` or `<upload_id>_<optimized_version>`
    pub version_param: String,
    /// Requested pixel size
    pub size: u32,
}

/// The version token split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVersion {
    pub upload_id: i64,
    pub optimized_version: i32,
}

/// Cache policy attached to a redirect decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Redirect back into this application (canonical size, stale-link repair)
    App,
    /// Redirect to a remote CDN; carries the medium-duration immutable directive
    Cdn,
}

/// Outcome of avatar resolution. Produced once per request, never mutated.
#[derive(Debug)]
pub enum ResolvedImage {
    LocalFile {
        path: PathBuf,
        last_modified: DateTime<Utc>,
    },
    Redirect {
        url: String,
        kind: RedirectKind,
    },
    /// To be fetched through the proxy cache and served like a local file
    Proxy {
        url: String,
        last_modified: DateTime<Utc>,
    },
    Blank,
}

/// Locally addressable URL for a user's avatar at a given size.
///
/// This is the canonical link shape the service itself serves, used for
/// nearest-canonical-size and stale-link-repair redirects.
pub fn local_avatar_url(
    base_url: &str,
    tenant: &str,
    encoded_username_lower: &str,
    upload_id: i64,
    size: u32,
) -> String {
    format!(
        "{}/user_avatar/{}/{}/{}_{}/{}.png",
        base_url.trim_end_matches('/'),
        tenant,
        encoded_username_lower,
        upload_id,
        OPTIMIZED_IMAGE_VERSION,
        size
    )
}

/// Avatar template with a literal `{size}` placeholder, as reported by the
/// gravatar-like refresh result
pub fn avatar_template(tenant: &str, encoded_username_lower: &str, upload_id: i64) -> String {
    format!(
        "/user_avatar/{}/{}/{}_{}/{{size}}.png",
        tenant, encoded_username_lower, upload_id, OPTIMIZED_IMAGE_VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_avatar_url() {
        assert_eq!(
            local_avatar_url("http://example.com/", "forum.example.com", "alice", 7, 48),
            "http://example.com/user_avatar/forum.example.com/alice/7_2/48.png"
        );
    }

    #[test]
    fn test_avatar_template_has_size_placeholder() {
        let template = avatar_template("forum.example.com", "alice", 7);
        assert!(template.ends_with("/7_2/{size}.png"));
        assert!(template.starts_with("/user_avatar/forum.example.com/alice/"));
    }
}
