use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub avatars: AvatarConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used when building redirect targets
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Content-addressed cache for proxied remote avatars
    #[serde(default = "default_proxy_cache_path")]
    pub proxy_cache_path: PathBuf,
    /// Private staging area for in-flight downloads, outside the cache namespace
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,
    /// Output directory of the letter-avatar generator
    #[serde(default = "default_letter_avatar_path")]
    pub letter_avatar_path: PathBuf,
    /// Root of the locally stored optimized renditions
    #[serde(default = "default_optimized_image_path")]
    pub optimized_image_path: PathBuf,
    /// Optional JSON seed for the in-memory user directory
    #[serde(default)]
    pub directory_seed: Option<PathBuf>,
}

/// Where optimized renditions live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Local,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Canonical pixel sizes; non-canonical requests are redirected to the
    /// nearest member when the store is external
    #[serde(default = "default_avatar_sizes")]
    pub sizes: Vec<u32>,
    #[serde(default = "default_store_kind")]
    pub store: StoreKind,
    /// Maximum size of a single proxied download
    #[serde(default = "default_max_proxy_file_size")]
    pub max_proxy_file_size: u64,
    /// Read timeout for remote fetches ("10s")
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,
    /// When true, remote renditions redirect to the CDN instead of proxying
    #[serde(default = "default_redirect_avatar_requests")]
    pub redirect_avatar_requests: bool,
    /// Upgrade scheme-relative source URLs to https instead of http
    #[serde(default = "default_force_https")]
    pub force_https: bool,
    /// Site-level template for system avatars; the proxy-letter route only
    /// operates when this begins with "/letter_avatar_proxy"
    #[serde(default = "default_external_system_avatars_url")]
    pub external_system_avatars_url: String,
    /// Remote origin the proxy-letter route fetches from
    #[serde(default = "default_proxy_letter_base_url")]
    pub proxy_letter_base_url: String,
    /// Gravatar-like avatar-by-identity source
    #[serde(default = "default_gravatar_base_url")]
    pub gravatar_base_url: String,
    /// CDN prefix substituted into remote rendition URLs, when present
    #[serde(default)]
    pub cdn_base_url: Option<String>,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_url() -> String {
    format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT)
}

// Storage defaults
fn default_proxy_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROXY_CACHE_PATH)
}

fn default_temp_path() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_PATH)
}

fn default_letter_avatar_path() -> PathBuf {
    PathBuf::from(DEFAULT_LETTER_AVATAR_PATH)
}

fn default_optimized_image_path() -> PathBuf {
    PathBuf::from(DEFAULT_OPTIMIZED_IMAGE_PATH)
}

// Avatar defaults
fn default_avatar_sizes() -> Vec<u32> {
    DEFAULT_AVATAR_SIZES.to_vec()
}

fn default_store_kind() -> StoreKind {
    StoreKind::Local
}

fn default_max_proxy_file_size() -> u64 {
    DEFAULT_MAX_PROXY_FILE_SIZE
}

fn default_read_timeout() -> String {
    DEFAULT_READ_TIMEOUT.to_string()
}

fn default_redirect_avatar_requests() -> bool {
    DEFAULT_REDIRECT_AVATAR_REQUESTS
}

fn default_force_https() -> bool {
    DEFAULT_FORCE_HTTPS
}

fn default_external_system_avatars_url() -> String {
    DEFAULT_EXTERNAL_SYSTEM_AVATARS_URL.to_string()
}

fn default_proxy_letter_base_url() -> String {
    DEFAULT_PROXY_LETTER_BASE_URL.to_string()
}

fn default_gravatar_base_url() -> String {
    DEFAULT_GRAVATAR_BASE_URL.to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            proxy_cache_path: default_proxy_cache_path(),
            temp_path: default_temp_path(),
            letter_avatar_path: default_letter_avatar_path(),
            optimized_image_path: default_optimized_image_path(),
            directory_seed: None,
        }
    }
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            sizes: default_avatar_sizes(),
            store: default_store_kind(),
            max_proxy_file_size: default_max_proxy_file_size(),
            read_timeout: default_read_timeout(),
            redirect_avatar_requests: default_redirect_avatar_requests(),
            force_https: default_force_https(),
            external_system_avatars_url: default_external_system_avatars_url(),
            proxy_letter_base_url: default_proxy_letter_base_url(),
            gravatar_base_url: default_gravatar_base_url(),
            cdn_base_url: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Parse the configured fetch read timeout
    pub fn read_timeout(&self) -> Result<std::time::Duration> {
        humantime::parse_duration(&self.avatars.read_timeout).map_err(|e| {
            anyhow::anyhow!(
                "invalid avatars.read_timeout '{}': {}",
                self.avatars.read_timeout,
                e
            )
        })
    }
}
