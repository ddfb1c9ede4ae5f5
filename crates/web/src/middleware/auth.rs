//! Authentication middleware and extractors.
//!
//! Provides extractors for requiring a logged-in user in route handlers and
//! the per-page template context.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::flash::{Flash, push_flash, take_flashes};
use crate::models::{CurrentUser, session_keys};

/// Flash shown when a guest hits a page that needs an account.
pub const LOGIN_REQUIRED_MESSAGE: &str = "You must be logged in to do that!";

/// Extractor that requires an authenticated user.
///
/// HTML requests without a user get a flash and a redirect to `/login`;
/// requests under `/api/` get a bare 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but the user is not logged in.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Nested routers see a stripped path; the original keeps `/api/`.
        let is_api = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path(), |original| original.0.path())
            .starts_with("/api/");

        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let user: Option<CurrentUser> = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();

        match user {
            Some(user) => Ok(Self(user)),
            None if is_api => Err(AuthRejection::Unauthorized),
            None => {
                if let Err(e) = push_flash(session, Flash::error(LOGIN_REQUIRED_MESSAGE)).await {
                    tracing::warn!(error = %e, "failed to queue login flash");
                }
                Err(AuthRejection::RedirectToLogin)
            }
        }
    }
}

/// What every rendered page needs: who is logged in and pending flashes.
#[derive(Debug, Default)]
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub flashes: Vec<Flash>,
}

impl PageContext {
    /// Read the current user and drain the flash queue.
    ///
    /// Call this only once the handler knows it will render a page, so
    /// flashes survive redirects.
    pub async fn load(session: &Session) -> Self {
        let user = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();

        let flashes = take_flashes(session).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read flashes");
            Vec::new()
        });

        Self { user, flashes }
    }

    /// Whether `flashes` holds anything.
    #[must_use]
    pub fn has_flashes(&self) -> bool {
        !self.flashes.is_empty()
    }
}

/// Helper to set the current user in the session.
///
/// Rotates the session id so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session.cycle_id().await
}
