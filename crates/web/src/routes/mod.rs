//! HTTP route handlers for the store directory.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Stores
//! GET  /                       - Listing, page 1
//! GET  /stores                 - Listing, page 1
//! GET  /stores/page/{page}     - Listing, page N
//! GET  /store/{slug}           - Store detail with reviews
//! GET  /add                    - Add store form (auth)
//! POST /add                    - Create store, multipart (auth)
//! GET  /stores/{id}/edit       - Edit store form (auth, author)
//! POST /add/{id}               - Update store, multipart (auth, author)
//! GET  /tags                   - Tagged stores + tag counts
//! GET  /tags/{tag}             - Stores with one tag + tag counts
//! GET  /map                    - Map page
//! GET  /hearts                 - Hearted stores (auth)
//! GET  /top                    - Top rated stores
//!
//! # Reviews
//! POST /reviews/{id}           - Add a review (auth)
//!
//! # Auth
//! GET  /login                  - Login page
//! POST /login                  - Login action
//! GET  /register               - Register page
//! POST /register               - Register action
//! POST /logout                 - Logout action
//!
//! # Account
//! GET  /account                - Account form (auth)
//! POST /account                - Update name/email (auth)
//! POST /account/forgot         - Email a reset link
//! GET  /account/reset/{token}  - New password form
//! POST /account/reset/{token}  - Set new password
//!
//! # JSON API
//! GET  /api/search?q=          - Full-text search
//! GET  /api/stores/near?lng=&lat= - Stores near a point
//! POST /api/stores/{id}/heart  - Toggle heart (auth, 401 otherwise)
//!
//! # Files
//! GET  /static/*               - Bundled assets
//! GET  /uploads/*              - Resized store photos
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod reviews;
pub mod stores;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header},
    response::Redirect,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{Session, SessionManagerLayer, SessionStore, service::SignedCookie};

use crate::error::AppError;
use crate::middleware::{
    Flash, FlashKind, make_request_span, push_flash, push_flashes, request_id_middleware,
};
use crate::state::AppState;

/// Largest accepted store form, photo included.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the store routes router.
pub fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(stores::index))
        .route("/stores", get(stores::index))
        .route("/stores/page/{page}", get(stores::page))
        .route("/stores/{id}/edit", get(stores::edit_page))
        .route("/store/{slug}", get(stores::show))
        .route("/add", get(stores::add_page).post(stores::create))
        .route("/add/{id}", post(stores::update))
        .route("/tags", get(stores::tags))
        .route("/tags/{tag}", get(stores::tag))
        .route("/map", get(stores::map_page))
        .route("/hearts", get(stores::hearts))
        .route("/top", get(stores::top))
        .route("/reviews/{id}", post(reviews::add))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create the auth and account routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/account", get(account::index).post(account::update))
        .route("/account/forgot", post(auth::forgot))
        .route(
            "/account/reset/{token}",
            get(auth::reset_page).post(auth::reset),
        )
}

/// Create the JSON API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(api::search))
        .route("/stores/near", get(api::near))
        .route("/stores/{id}/heart", post(api::heart))
}

/// Create all page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(store_routes())
        .merge(auth_routes())
        .nest("/api", api_routes())
}

/// Build the full application: routes, files, sessions, tracing and request ids.
///
/// Sentry layers are added by the binary on top of this.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S, SignedCookie>) -> Router
where
    S: SessionStore + Clone,
{
    let static_dir = ServeDir::new(&state.config().static_dir);
    let uploads_dir = ServeDir::new(state.photos().dir());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .nest_service("/static", static_dir)
        .nest_service("/uploads", uploads_dir)
        .fallback(not_found)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.repos().stores.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("Page".to_owned())
}

// =============================================================================
// Handler Helpers
// =============================================================================

/// Queue a flash for the next page, logging instead of failing on error.
pub(crate) async fn flash(session: &Session, flash: Flash) {
    if let Err(e) = push_flash(session, flash).await {
        tracing::warn!(error = %e, "failed to queue flash");
    }
}

/// Queue one flash of `kind` per message.
pub(crate) async fn flash_all(session: &Session, kind: FlashKind, messages: Vec<String>) {
    if let Err(e) = push_flashes(session, kind, messages).await {
        tracing::warn!(error = %e, "failed to queue flashes");
    }
}

/// Redirect to the page named by `Referer`, or to `fallback`.
///
/// Only the path and query of the referrer are kept, so the redirect never
/// leaves this site.
pub(crate) fn redirect_back(headers: &HeaderMap, fallback: &str) -> Redirect {
    let target = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(local_target);

    Redirect::to(target.as_deref().unwrap_or(fallback))
}

fn local_target(referer: &str) -> Option<String> {
    if referer.starts_with('/') && !referer.starts_with("//") {
        return Some(referer.to_owned());
    }

    let url = url::Url::parse(referer).ok()?;
    let mut target = url.path().to_owned();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    (!target.starts_with("//")).then_some(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{http::HeaderValue, response::IntoResponse};

    use super::*;

    fn location(redirect: Redirect) -> String {
        redirect
            .into_response()
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn test_redirect_back_without_referer() {
        assert_eq!(location(redirect_back(&HeaderMap::new(), "/stores")), "/stores");
    }

    #[test]
    fn test_redirect_back_keeps_path_only() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://evil.example/store/cafe?x=1"),
        );
        assert_eq!(location(redirect_back(&headers, "/stores")), "/store/cafe?x=1");

        headers.insert(header::REFERER, HeaderValue::from_static("//evil.example/x"));
        assert_eq!(location(redirect_back(&headers, "/stores")), "/stores");
    }
}
