//! Web layer module
//!
//! Thin handlers over the resolution services. Routes:
//!
//! - `GET /user_avatar/{hostname}/{username}/{version}/{size}.png`
//! - `GET /letter_avatar/{username}/{version}/{size}.png`
//! - `GET /letter_avatar_proxy/{version}/letter/{letter}/{color}/{size}.png`
//! - `POST /user_avatar/{username}/refresh_gravatar.json`
//! - `GET /health`

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::services::{
    AvatarResolver, GravatarSource, LetterAvatars, ProxyCache, UserDirectory,
};

pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<dyn UserDirectory>,
    pub resolver: Arc<AvatarResolver>,
    pub proxy_cache: ProxyCache,
    pub letter_avatars: Arc<dyn LetterAvatars>,
    pub gravatar: Arc<dyn GravatarSource>,
    /// Tenant assumed when a request carries no Host header
    pub default_tenant: String,
}

impl AppState {
    pub fn new(
        config: Config,
        directory: Arc<dyn UserDirectory>,
        resolver: Arc<AvatarResolver>,
        proxy_cache: ProxyCache,
        letter_avatars: Arc<dyn LetterAvatars>,
        gravatar: Arc<dyn GravatarSource>,
    ) -> Self {
        let default_tenant = url::Url::parse(&config.web.base_url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
            .unwrap_or_else(|| "localhost".to_string());
        Self {
            config: Arc::new(config),
            directory,
            resolver,
            proxy_cache,
            letter_avatars,
            gravatar,
            default_tenant,
        }
    }
}

/// Create the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/user_avatar/{hostname}/{username}/{version}/{size}",
            get(handlers::avatars::show),
        )
        .route(
            "/letter_avatar/{username}/{version}/{size}",
            get(handlers::avatars::show_letter),
        )
        .route(
            "/letter_avatar_proxy/{version}/letter/{letter}/{color}/{size}",
            get(handlers::avatars::show_proxy_letter),
        )
        .route(
            "/user_avatar/{username}/refresh_gravatar.json",
            post(handlers::avatars::refresh_gravatar),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!(
            "{}:{}",
            state.config.web.host, state.config.web.port
        )
        .parse()?;
        let app = create_router(state);
        Ok(Self { app, addr })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("avatar proxy listening on {}", self.addr);
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}
