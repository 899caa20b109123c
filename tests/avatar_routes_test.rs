use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use avatar_proxy::{
    assets::ImageAssets,
    config::{Config, StoreKind},
    models::{ImageOrigin, Upload, User, UserAvatar},
    services::{
        AvatarResolver, AvatarSettings, DiskLetterAvatars, GravatarClient, InMemoryDirectory,
        LocalImageStore, OptimizedImageStore, ProxyCache, RemoteImageStore,
    },
    web::{AppState, create_router},
};

const TENANT: &str = "forum.example.com";
const BLANK_CACHE: &str = "public, max-age=600";
const BLANK_LAST_MODIFIED: &str = "Mon, 01 Jan 1990 00:00:00 GMT";

struct TestHarness {
    app: Router,
    directory: Arc<InMemoryDirectory>,
    store: LocalImageStore,
    _data_dir: TempDir,
}

/// Build a full application with all storage under a throwaway directory
async fn harness(mutate: impl FnOnce(&mut Config)) -> TestHarness {
    let data_dir = tempfile::tempdir().unwrap();
    let root = data_dir.path();

    let mut config = Config::default();
    config.web.base_url = format!("http://{TENANT}");
    config.storage.proxy_cache_path = root.join("proxy");
    config.storage.temp_path = root.join("temp");
    config.storage.letter_avatar_path = root.join("letters");
    config.storage.optimized_image_path = root.join("optimized");
    mutate(&mut config);

    for dir in [
        &config.storage.proxy_cache_path,
        &config.storage.temp_path,
        &config.storage.letter_avatar_path,
        &config.storage.optimized_image_path,
    ] {
        tokio::fs::create_dir_all(dir).await.unwrap();
    }

    let directory = Arc::new(InMemoryDirectory::new());
    let local_store = LocalImageStore::new(config.storage.optimized_image_path.clone());
    let store: Arc<dyn OptimizedImageStore> = match config.avatars.store {
        StoreKind::Local => Arc::new(LocalImageStore::new(
            config.storage.optimized_image_path.clone(),
        )),
        StoreKind::External => Arc::new(RemoteImageStore::new(
            config.avatars.cdn_base_url.clone(),
            config.avatars.force_https,
        )),
    };

    let proxy_cache = ProxyCache::new(
        config.storage.proxy_cache_path.clone(),
        config.storage.temp_path.clone(),
        config.avatars.max_proxy_file_size,
        Duration::from_secs(5),
        config.avatars.force_https,
    )
    .unwrap();
    let letter_avatars = Arc::new(DiskLetterAvatars::new(
        config.storage.letter_avatar_path.clone(),
    ));
    let gravatar = Arc::new(
        GravatarClient::new(
            config.avatars.gravatar_base_url.clone(),
            Duration::from_secs(5),
            directory.clone(),
        )
        .unwrap(),
    );
    let resolver = Arc::new(AvatarResolver::new(
        directory.clone(),
        store,
        AvatarSettings::from(&config),
    ));

    let state = AppState::new(
        config,
        directory.clone(),
        resolver,
        proxy_cache,
        letter_avatars,
        gravatar,
    );
    TestHarness {
        app: create_router(state),
        directory,
        store: local_store,
        _data_dir: data_dir,
    }
}

impl TestHarness {
    async fn get(&self, uri: &str) -> axum::response::Response {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::HOST, TENANT)
            .body(Body::empty())
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn post(&self, uri: &str, api_username: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, TENANT);
        if let Some(name) = api_username {
            builder = builder.header("api-username", name);
        }
        let request = builder.body(Body::empty()).unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Seed a user with a raster upload they currently wear
    async fn seed_user_with_upload(&self, user_id: i64, username: &str, upload_id: i64) {
        self.directory
            .add_user(
                TENANT,
                User {
                    id: user_id,
                    username: username.to_string(),
                    email: None,
                    uploaded_avatar_id: Some(upload_id),
                    admin: false,
                },
            )
            .await;
        self.directory
            .add_avatar(
                TENANT,
                UserAvatar {
                    user_id,
                    custom_upload_id: Some(upload_id),
                    gravatar_upload_id: None,
                },
            )
            .await;
        self.directory
            .add_upload(
                TENANT,
                Upload {
                    id: upload_id,
                    extension: "png".to_string(),
                    created_at: Utc::now(),
                    origin: ImageOrigin::Local {
                        path: PathBuf::from("unused-original.png"),
                    },
                },
            )
            .await;
    }

    /// Place rendition bytes where the local store expects them
    async fn write_rendition(&self, upload_id: i64, size: u32, bytes: &[u8]) -> PathBuf {
        let path = self.store.optimized_path(TENANT, upload_id, size, size, "png");
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }
}

fn header_str<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Assert the standard blank-placeholder contract: 200, short-lived cache,
/// fixed Last-Modified, placeholder bytes with an exact Content-Length.
async fn assert_blank(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "cache-control"), BLANK_CACHE);
    assert_eq!(header_str(&response, "last-modified"), BLANK_LAST_MODIFIED);
    let expected = ImageAssets::blank_avatar().len();
    assert_eq!(
        header_str(&response, "content-length"),
        expected.to_string()
    );
    assert_eq!(body_bytes(response).await.len(), expected);
}

/// Spawn a throwaway HTTP server answering every path with fixed bytes after
/// an optional delay, counting how many requests actually reach it.
async fn spawn_image_server_with_delay(
    status: StatusCode,
    bytes: Vec<u8>,
    delay: Duration,
) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handle = hits.clone();
    let app = Router::new().route(
        "/{*path}",
        get(move || {
            let hits = hits_handle.clone();
            let bytes = bytes.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                (status, [("content-type", "image/png")], bytes).into_response()
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

async fn spawn_image_server(status: StatusCode, bytes: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    spawn_image_server_with_delay(status, bytes, Duration::ZERO).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = harness(|_| {}).await;
    let response = harness.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_local_avatar_served_immutable() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "Bob", 42).await;
    let bytes = b"fake png rendition".to_vec();
    harness.write_rendition(42, 48, &bytes).await;

    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/42_2/48.png"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, "cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(header_str(&response, "content-type"), "image/png");
    assert_eq!(
        header_str(&response, "content-length"),
        bytes.len().to_string()
    );
    assert!(!header_str(&response, "last-modified").is_empty());
    assert_eq!(body_bytes(response).await, bytes);
}

#[tokio::test]
async fn test_size_out_of_range_serves_blank() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "bob", 42).await;

    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/42_2/1001.png"))
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_future_version_serves_blank() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "bob", 42).await;
    harness.write_rendition(42, 48, b"rendition").await;

    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/42_99/48.png"))
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_nonpositive_upload_id_serves_blank() {
    let harness = harness(|_| {}).await;

    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/0_2/48.png"))
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_unknown_user_serves_blank() {
    let harness = harness(|_| {}).await;

    let response = harness
        .get(&format!("/user_avatar/{TENANT}/nobody/42_2/48.png"))
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_missing_rendition_serves_blank() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "bob", 42).await;

    // No rendition file on disk for this size
    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/42_2/48.png"))
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_stale_link_redirects_to_current_avatar() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "bob", 42).await;

    // Upload 17 was never bob's; a shared link from before the change
    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/17_2/48.png"))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_str(&response, "location"),
        format!("http://{TENANT}/user_avatar/{TENANT}/bob/42_2/48.png")
    );
}

#[tokio::test]
async fn test_external_store_redirects_noncanonical_size() {
    let harness = harness(|config| {
        config.avatars.store = StoreKind::External;
    })
    .await;

    // 36 is equidistant from 24 and 48; the smaller size wins
    let response = harness
        .get(&format!("/user_avatar/{TENANT}/bob/42_2/36.png"))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_str(&response, "location"),
        format!("http://{TENANT}/user_avatar/{TENANT}/bob/42_2/24.png")
    );
}

#[tokio::test]
async fn test_remote_upload_proxied_through_cache() {
    let payload = b"remote avatar bytes".to_vec();
    let (base_url, hits) = spawn_image_server(StatusCode::OK, payload.clone()).await;

    let harness = harness(|_| {}).await;
    harness
        .directory
        .add_user(
            TENANT,
            User {
                id: 1,
                username: "bob".to_string(),
                email: None,
                uploaded_avatar_id: Some(42),
                admin: false,
            },
        )
        .await;
    harness
        .directory
        .add_avatar(
            TENANT,
            UserAvatar {
                user_id: 1,
                custom_upload_id: Some(42),
                gravatar_upload_id: None,
            },
        )
        .await;
    // Vector upload: served from its origin without a local rendition
    harness
        .directory
        .add_upload(
            TENANT,
            Upload {
                id: 42,
                extension: "svg".to_string(),
                created_at: Utc::now(),
                origin: ImageOrigin::Remote {
                    url: format!("{base_url}/avatars/bob.svg"),
                },
            },
        )
        .await;

    let uri = format!("/user_avatar/{TENANT}/bob/42_2/48.png");
    let first = harness.get(&uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        header_str(&first, "cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(body_bytes(first).await, payload);

    // Second request is a cache hit and never reaches the origin again
    let second = harness.get(&uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, payload);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_request_does_not_abort_proxy_download() {
    let payload = b"slow remote avatar".to_vec();
    let (base_url, hits) =
        spawn_image_server_with_delay(StatusCode::OK, payload.clone(), Duration::from_millis(300))
            .await;

    let harness = harness(|_| {}).await;
    harness
        .directory
        .add_user(
            TENANT,
            User {
                id: 1,
                username: "bob".to_string(),
                email: None,
                uploaded_avatar_id: Some(42),
                admin: false,
            },
        )
        .await;
    harness
        .directory
        .add_avatar(
            TENANT,
            UserAvatar {
                user_id: 1,
                custom_upload_id: Some(42),
                gravatar_upload_id: None,
            },
        )
        .await;
    harness
        .directory
        .add_upload(
            TENANT,
            Upload {
                id: 42,
                extension: "svg".to_string(),
                created_at: Utc::now(),
                origin: ImageOrigin::Remote {
                    url: format!("{base_url}/avatars/bob.svg"),
                },
            },
        )
        .await;

    // A client disconnect drops the request future mid-download
    let uri = format!("/user_avatar/{TENANT}/bob/42_2/48.png");
    let dropped = tokio::time::timeout(Duration::from_millis(100), harness.get(&uri)).await;
    assert!(dropped.is_err());

    // The download finishes on its own task and populates the cache, so the
    // next request is served without going back to the origin
    tokio::time::sleep(Duration::from_millis(500)).await;
    let response = harness.get(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, payload);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_letter_avatar_served_for_current_version() {
    let harness = harness(|_| {}).await;

    let response = harness.get("/letter_avatar/bob/v4/48.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/png");
    assert_eq!(
        header_str(&response, "cache-control"),
        "public, max-age=31536000, immutable"
    );
}

#[tokio::test]
async fn test_letter_avatar_stale_version_serves_blank() {
    let harness = harness(|_| {}).await;

    let response = harness.get("/letter_avatar/bob/v3/48.png").await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_proxy_letter_disabled_returns_not_found() {
    let harness = harness(|config| {
        config.avatars.external_system_avatars_url =
            "https://elsewhere.example.com/{first_letter}.png".to_string();
    })
    .await;

    let response = harness
        .get("/letter_avatar_proxy/v4/letter/b/78be20/48.png")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_proxy_letter_fetches_once_and_caches() {
    let payload = b"letter avatar png".to_vec();
    let (base_url, hits) = spawn_image_server(StatusCode::OK, payload.clone()).await;

    let harness = harness(move |config| {
        config.avatars.proxy_letter_base_url = base_url;
    })
    .await;

    let uri = "/letter_avatar_proxy/v4/letter/b/78be20/48.png";
    let first = harness.get(uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, "last-modified"), BLANK_LAST_MODIFIED);
    assert_eq!(
        header_str(&first, "cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(body_bytes(first).await, payload);

    let second = harness.get(uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, payload);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_proxy_upstream_failure_serves_blank() {
    let (base_url, _hits) = spawn_image_server(StatusCode::NOT_FOUND, Vec::new()).await;

    let harness = harness(move |config| {
        config.avatars.proxy_letter_base_url = base_url;
    })
    .await;

    let response = harness
        .get("/letter_avatar_proxy/v4/letter/b/78be20/48.png")
        .await;
    assert_blank(response).await;
}

#[tokio::test]
async fn test_refresh_gravatar_unknown_user() {
    let harness = harness(|_| {}).await;

    let response = harness
        .post("/user_avatar/nobody/refresh_gravatar.json", Some("admin"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["success"], serde_json::Value::Bool(false));
    assert!(json["error"].as_str().unwrap().contains("nobody"));
}

#[tokio::test]
async fn test_refresh_gravatar_requires_permission() {
    let harness = harness(|_| {}).await;
    harness.seed_user_with_upload(1, "bob", 42).await;
    harness
        .directory
        .add_user(
            TENANT,
            User {
                id: 2,
                username: "mallory".to_string(),
                email: None,
                uploaded_avatar_id: None,
                admin: false,
            },
        )
        .await;

    // No credentials at all
    let anonymous = harness
        .post("/user_avatar/bob/refresh_gravatar.json", None)
        .await;
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

    // A different, non-admin user
    let other = harness
        .post("/user_avatar/bob/refresh_gravatar.json", Some("mallory"))
        .await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_refresh_gravatar_without_upstream_match() {
    let (base_url, _hits) = spawn_image_server(StatusCode::NOT_FOUND, Vec::new()).await;

    let harness = harness(move |config| {
        config.avatars.gravatar_base_url = base_url;
    })
    .await;
    harness
        .directory
        .add_user(
            TENANT,
            User {
                id: 1,
                username: "bob".to_string(),
                email: Some("bob@example.com".to_string()),
                uploaded_avatar_id: None,
                admin: false,
            },
        )
        .await;

    // Self-refresh is always allowed
    let response = harness
        .post("/user_avatar/bob/refresh_gravatar.json", Some("bob"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["gravatar_upload_id"], serde_json::Value::Null);
    assert_eq!(json["gravatar_avatar_template"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_refresh_gravatar_registers_upload() {
    let (base_url, hits) = spawn_image_server(StatusCode::OK, b"gravatar image".to_vec()).await;

    let harness = harness(move |config| {
        config.avatars.gravatar_base_url = base_url;
    })
    .await;
    harness
        .directory
        .add_user(
            TENANT,
            User {
                id: 1,
                username: "bob".to_string(),
                email: Some("bob@example.com".to_string()),
                uploaded_avatar_id: None,
                admin: false,
            },
        )
        .await;

    let response = harness
        .post("/user_avatar/bob/refresh_gravatar.json", Some("bob"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let upload_id = json["gravatar_upload_id"].as_i64().unwrap();
    assert!(upload_id > 0);
    let template = json["gravatar_avatar_template"].as_str().unwrap();
    assert_eq!(
        template,
        format!("/user_avatar/{TENANT}/bob/{upload_id}_2/{{size}}.png")
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
