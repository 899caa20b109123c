use rust_embed::RustEmbed;

/// Embedded image assets (placeholder avatar)
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct ImageAssets;

impl ImageAssets {
    /// The fixed placeholder avatar served whenever resolution degrades to blank
    pub fn blank_avatar() -> std::borrow::Cow<'static, [u8]> {
        Self::get("avatar.png")
            .map(|f| f.data)
            .expect("avatar.png is embedded at compile time")
    }

    /// Get the content type for a given file extension
    pub fn get_content_type(path: &str) -> &'static str {
        match path.split('.').next_back() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("svg") => "image/svg+xml; charset=utf-8",
            Some("ico") => "image/x-icon",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_avatar_is_png() {
        let bytes = ImageAssets::blank_avatar();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ImageAssets::get_content_type("a.png"), "image/png");
        assert_eq!(ImageAssets::get_content_type("b.jpeg"), "image/jpeg");
        assert_eq!(
            ImageAssets::get_content_type("noext"),
            "application/octet-stream"
        );
    }
}
