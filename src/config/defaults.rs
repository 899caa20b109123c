/// Configuration default values
///
/// All defaults live here so they are changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
// Note: base_url is the ONLY truly mandatory field with no default

// Storage defaults
pub const DEFAULT_PROXY_CACHE_PATH: &str = "./data/avatar_proxy";
pub const DEFAULT_TEMP_PATH: &str = "./data/temp";
pub const DEFAULT_LETTER_AVATAR_PATH: &str = "./data/letter_avatars";
pub const DEFAULT_OPTIMIZED_IMAGE_PATH: &str = "./data/optimized";

// Avatar defaults
pub const DEFAULT_AVATAR_SIZES: &[u32] = &[24, 48, 72, 96, 144, 288];
pub const DEFAULT_MAX_PROXY_FILE_SIZE: u64 = 1024 * 1024; // 1 MiB
pub const DEFAULT_READ_TIMEOUT: &str = "10s";
pub const DEFAULT_REDIRECT_AVATAR_REQUESTS: bool = false;
pub const DEFAULT_FORCE_HTTPS: bool = true;
pub const DEFAULT_EXTERNAL_SYSTEM_AVATARS_URL: &str =
    "/letter_avatar_proxy/v4/letter/{first_letter}/{color}/{size}.png";
pub const DEFAULT_PROXY_LETTER_BASE_URL: &str = "https://avatars.discourse-cdn.com";
pub const DEFAULT_GRAVATAR_BASE_URL: &str = "https://www.gravatar.com";
