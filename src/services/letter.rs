//! Letter-avatar generation collaborator
//!
//! The pixel-rendering algorithm is external; the serving path only needs a
//! version token to gate requests on and a file to send. Letter avatars have
//! their own version space, distinct from the optimized-image version: a
//! mismatching token degrades to blank rather than serving output from an
//! older generation scheme.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use crate::assets::ImageAssets;

/// Currently supported letter-avatar generation scheme
pub const LETTER_AVATAR_VERSION: &str = "v4";

#[async_trait]
pub trait LetterAvatars: Send + Sync {
    fn version(&self) -> &str;

    /// Produce (or reuse) the letter avatar for `username` at `size` pixels
    /// and return its on-disk path.
    async fn generate(&self, username: &str, size: u32) -> anyhow::Result<PathBuf>;
}

/// Disk-backed generator keyed by (initial, size).
///
/// Files are written once and reused. The bundled placeholder art stands in
/// for the external renderer's output.
pub struct DiskLetterAvatars {
    dir: PathBuf,
}

impl DiskLetterAvatars {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn letter_for(username: &str) -> char {
        username
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('a')
    }
}

#[async_trait]
impl LetterAvatars for DiskLetterAvatars {
    fn version(&self) -> &str {
        LETTER_AVATAR_VERSION
    }

    async fn generate(&self, username: &str, size: u32) -> anyhow::Result<PathBuf> {
        let letter = Self::letter_for(username);
        let path = self
            .dir
            .join(format!("{LETTER_AVATAR_VERSION}_{letter}_{size}.png"));

        if !fs::try_exists(&path).await.unwrap_or(false) {
            fs::create_dir_all(&self.dir).await?;
            fs::write(&path, ImageAssets::blank_avatar().as_ref()).await?;
        }

        Ok(path)
    }
}
