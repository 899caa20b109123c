pub mod directory;
pub mod gravatar;
pub mod letter;
pub mod optimized;
pub mod proxy_cache;
pub mod resolver;
pub mod version;

pub use directory::{InMemoryDirectory, UserDirectory};
pub use gravatar::{GravatarClient, GravatarSource};
pub use letter::{DiskLetterAvatars, LetterAvatars, LETTER_AVATAR_VERSION};
pub use optimized::{LocalImageStore, OptimizedImage, OptimizedImageStore, RemoteImageStore};
pub use proxy_cache::ProxyCache;
pub use resolver::{AvatarResolver, AvatarSettings};
pub use version::VersionGuard;
