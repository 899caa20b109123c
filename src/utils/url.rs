//! URL utilities for consistent URL handling

use url::Url;

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Upgrade a scheme-relative URL (`//host/path`) to the site's configured
    /// scheme. Already-absolute URLs pass through unchanged.
    pub fn upgrade_scheme_relative(url: &str, force_https: bool) -> String {
        if let Some(rest) = url.strip_prefix("//") {
            let scheme = if force_https { "https" } else { "http" };
            format!("{scheme}://{rest}")
        } else {
            url.to_string()
        }
    }

    /// File extension of a URL's path, including the leading dot.
    ///
    /// Returns an empty string when the final path segment has none. Query
    /// parameters and fragments never leak into the result.
    pub fn extension_of(url: &str) -> String {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            // Fall back to the raw string with query/fragment stripped
            Err(_) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        let file_part = path.rsplit('/').next().unwrap_or_default();
        match file_part.rfind('.') {
            Some(0) | None => String::new(),
            Some(dot) => file_part[dot..].to_string(),
        }
    }
}
