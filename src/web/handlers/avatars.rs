//! Avatar route handlers
//!
//! The three public image routes never fail: anything that goes wrong during
//! resolution answers with the blank placeholder and HTTP 200. Only the
//! authenticated refresh route and the proxy-letter configuration gate return
//! real error statuses.
//!
//! Resolution runs on an independently spawned task so a slow remote fetch
//! is bounded by its own read timeout rather than by any fixed per-request
//! deadline a front-end layer might enforce.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{AvatarRequest, ResolvedImage, avatar_template};
use crate::web::AppState;
use crate::web::responses::{self, blank_sentinel, build_image_response, render_blank};

/// Pixel size from a path segment that may carry a `.png` suffix
fn parse_size_param(raw: &str) -> Option<u32> {
    raw.strip_suffix(".png").unwrap_or(raw).parse().ok()
}

/// Tenant hostname for routes that do not carry one in the path
fn tenant_from_headers(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| host.split(':').next().unwrap_or(host).to_lowercase())
        .unwrap_or_else(|| state.default_tenant.clone())
}

/// GET /user_avatar/{hostname}/{username}/{version}/{size}.png
pub async fn show(
    State(state): State<AppState>,
    Path((hostname, username, version, size)): Path<(String, String, String, String)>,
) -> Response {
    let Some(size) = parse_size_param(&size) else {
        return render_blank();
    };

    let request = AvatarRequest {
        tenant: hostname,
        username,
        version_param: version,
        size,
    };

    // Resolution and the proxy fetch run on their own task: a client
    // disconnect drops this handler future, but a download already under
    // way still runs to completion and lands in the cache.
    let resolver = state.resolver.clone();
    let proxy_cache = state.proxy_cache.clone();
    let task = tokio::spawn(async move {
        let resolved = resolver.resolve(&request).await;
        build_image_response(&proxy_cache, resolved).await
    });
    task.await.unwrap_or_else(|_| render_blank())
}

/// GET /letter_avatar/{username}/{version}/{size}.png
pub async fn show_letter(
    State(state): State<AppState>,
    Path((username, version, size)): Path<(String, String, String)>,
) -> Response {
    // Distinct version space from the optimized-image version: only an exact
    // match against the current generation scheme is served.
    if version != state.letter_avatars.version() {
        return render_blank();
    }
    let Some(size) = parse_size_param(&size) else {
        return render_blank();
    };

    let letter_avatars = state.letter_avatars.clone();
    let generated =
        tokio::spawn(async move { letter_avatars.generate(&username, size).await }).await;

    match generated {
        Ok(Ok(path)) => {
            let last_modified = tokio::fs::metadata(&path)
                .await
                .ok()
                .and_then(|metadata| metadata.modified().ok())
                .map(chrono::DateTime::<chrono::Utc>::from)
                .unwrap_or_else(blank_sentinel);
            responses::serve_file(&path, last_modified).await
        }
        Ok(Err(err)) => {
            debug!("letter avatar generation failed: {err}");
            render_blank()
        }
        Err(_) => render_blank(),
    }
}

/// GET /letter_avatar_proxy/{version}/letter/{letter}/{color}/{size}.png
pub async fn show_proxy_letter(
    State(state): State<AppState>,
    Path((version, letter, color, size)): Path<(String, String, String, String)>,
) -> Response {
    // Site-level gate: the route only exists when system avatars are
    // configured to come from the letter-avatar proxy.
    if !state
        .config
        .avatars
        .external_system_avatars_url
        .starts_with("/letter_avatar_proxy")
    {
        return responses::handle_error(AppError::ConfigDisabled {
            setting: "external_system_avatars_url".to_string(),
        });
    }

    let Some(size) = parse_size_param(&size) else {
        return render_blank();
    };

    let url = format!(
        "{}/{}/letter/{}/{}/{}.png",
        state.config.avatars.proxy_letter_base_url.trim_end_matches('/'),
        version,
        letter,
        color,
        size
    );

    let proxy_cache = state.proxy_cache.clone();
    let resolved = ResolvedImage::Proxy {
        url,
        last_modified: blank_sentinel(),
    };
    tokio::spawn(async move { build_image_response(&proxy_cache, resolved).await })
        .await
        .unwrap_or_else(|_| render_blank())
}

#[derive(Debug, Serialize)]
pub struct RefreshGravatarResponse {
    pub gravatar_upload_id: Option<i64>,
    pub gravatar_avatar_template: Option<String>,
}

/// POST /user_avatar/{username}/refresh_gravatar.json
///
/// An authenticated mutation: unknown targets and missing permissions are
/// real errors here, not blanks.
pub async fn refresh_gravatar(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Response {
    let tenant = tenant_from_headers(&state, &headers);
    let username_lower = username.to_lowercase();

    let Some(user) = state.directory.find_user(&tenant, &username_lower).await else {
        return responses::handle_error(AppError::user_not_found(username_lower));
    };

    let actor = match headers
        .get("api-username")
        .and_then(|value| value.to_str().ok())
    {
        Some(name) => state.directory.find_user(&tenant, &name.to_lowercase()).await,
        None => None,
    };
    if !actor.is_some_and(|actor| actor.can_edit(&user)) {
        return responses::handle_error(AppError::permission_denied(
            "refresh_gravatar",
            format!("user {username_lower}"),
        ));
    }

    let directory = state.directory.clone();
    let gravatar = state.gravatar.clone();
    let task = tokio::spawn(async move {
        directory.ensure_user_avatar(&tenant, user.id).await;
        let upload_id = gravatar.refresh(&tenant, &user).await?;
        Ok::<_, AppError>(RefreshGravatarResponse {
            gravatar_upload_id: upload_id,
            gravatar_avatar_template: upload_id
                .map(|id| avatar_template(&tenant, &user.encoded_username_lower(), id)),
        })
    });

    match task.await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(err)) => responses::handle_error(err),
        Err(err) => responses::handle_error(AppError::internal(format!(
            "refresh task failed: {err}"
        ))),
    }
}
