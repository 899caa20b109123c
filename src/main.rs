use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avatar_proxy::{
    config::{Config, StoreKind},
    services::{
        AvatarResolver, AvatarSettings, DiskLetterAvatars, GravatarClient, InMemoryDirectory,
        LocalImageStore, OptimizedImageStore, ProxyCache, RemoteImageStore, UserDirectory,
    },
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "avatar-proxy")]
#[command(version = "0.1.0")]
#[command(about = "An avatar resolution and proxy caching service")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("avatar_proxy={},tower_http=trace", cli.log_level)
    } else {
        format!("avatar_proxy={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting avatar proxy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    // Storage directories must exist before the first request
    tokio::fs::create_dir_all(&config.storage.proxy_cache_path).await?;
    tokio::fs::create_dir_all(&config.storage.temp_path).await?;
    tokio::fs::create_dir_all(&config.storage.letter_avatar_path).await?;

    let directory: Arc<dyn UserDirectory> = match &config.storage.directory_seed {
        Some(path) => {
            let seeded = InMemoryDirectory::from_seed_file(path).await?;
            info!("User directory seeded from: {}", path.display());
            Arc::new(seeded)
        }
        None => Arc::new(InMemoryDirectory::new()),
    };

    let store: Arc<dyn OptimizedImageStore> = match config.avatars.store {
        StoreKind::Local => Arc::new(LocalImageStore::new(
            config.storage.optimized_image_path.clone(),
        )),
        StoreKind::External => Arc::new(RemoteImageStore::new(
            config.avatars.cdn_base_url.clone(),
            config.avatars.force_https,
        )),
    };

    let read_timeout = config.read_timeout()?;
    let proxy_cache = ProxyCache::new(
        config.storage.proxy_cache_path.clone(),
        config.storage.temp_path.clone(),
        config.avatars.max_proxy_file_size,
        read_timeout,
        config.avatars.force_https,
    )?;
    info!(
        "Proxy cache initialized at: {}",
        config.storage.proxy_cache_path.display()
    );

    let letter_avatars = Arc::new(DiskLetterAvatars::new(
        config.storage.letter_avatar_path.clone(),
    ));

    let gravatar = Arc::new(GravatarClient::new(
        config.avatars.gravatar_base_url.clone(),
        read_timeout,
        directory.clone(),
    )?);

    let resolver = Arc::new(AvatarResolver::new(
        directory.clone(),
        store,
        AvatarSettings::from(&config),
    ));

    let state = AppState::new(
        config,
        directory,
        resolver,
        proxy_cache,
        letter_avatars,
        gravatar,
    );
    let web_server = WebServer::new(state)?;
    web_server.run().await?;

    Ok(())
}
