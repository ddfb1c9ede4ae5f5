//! Account route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::error::Result;
use crate::filters;
use crate::middleware::{Flash, FlashKind, PageContext, RequireAuth};
use crate::models::{CurrentUser, session_keys};
use crate::services::AuthError;
use crate::state::AppState;
use crate::validation::{AccountForm, validate_account};

use super::{flash, flash_all, redirect_back};

/// Account edit page template.
#[derive(Template, WebTemplate)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub name: String,
    pub email: String,
}

/// Display the account form with the stored name and email.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Response> {
    let user = state.auth().get_user(user.id).await?;

    Ok(AccountTemplate {
        ctx: PageContext::load(&session).await,
        title: "Edit Your Account".to_owned(),
        name: user.name,
        email: user.email.into_inner(),
    }
    .into_response())
}

/// Update name and email.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<AccountForm>,
) -> Result<Redirect> {
    let (name, email) = match validate_account(&form) {
        Ok(valid) => valid,
        Err(errors) => {
            flash_all(&session, FlashKind::Error, errors).await;
            return Ok(redirect_back(&headers, "/account"));
        }
    };

    let updated = match state.auth().update_profile(user.id, &name, &email).await {
        Ok(updated) => updated,
        Err(AuthError::UserAlreadyExists) => {
            flash(
                &session,
                Flash::error("A user with the given email is already registered"),
            )
            .await;
            return Ok(redirect_back(&headers, "/account"));
        }
        Err(e) => return Err(e.into()),
    };

    session
        .insert(session_keys::CURRENT_USER, CurrentUser::from(&updated))
        .await?;
    tracing::info!(user_id = %updated.id, "profile updated");

    flash(&session, Flash::success("Updated the profile!")).await;
    Ok(redirect_back(&headers, "/account"))
}
