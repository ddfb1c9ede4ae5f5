//! Authentication route handlers.
//!
//! Handles login, registration, logout and the emailed password reset.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{Flash, PageContext, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::{AuthError, OutgoingMail};
use crate::state::AppState;
use crate::validation::{PASSWORD_BLANK, PasswordForm, RegisterForm, validate_register};

use super::{flash, redirect_back};

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Forgot password form data.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    pub email: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template, with the forgot-password form.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub ctx: PageContext,
    pub title: String,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub name: String,
    pub email: String,
}

/// Reset password page template.
#[derive(Template, WebTemplate)]
#[template(path = "reset.html")]
pub struct ResetPasswordTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub token: String,
}

/// Put `user` in the session and tag Sentry events with them.
async fn log_in(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(())
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(session: Session) -> impl IntoResponse {
    LoginTemplate {
        ctx: PageContext::load(&session).await,
        title: "Login".to_owned(),
    }
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    match state.auth().login(&form.email, &form.password).await {
        Ok(user) => {
            log_in(&session, &user).await?;
            flash(&session, Flash::success("You are now logged in!")).await;
            Ok(Redirect::to("/").into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            tracing::warn!("login failed");
            flash(&session, Flash::error("Failed Login!")).await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handle logout.
pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    flash(&session, Flash::success("You are now logged out!")).await;
    Ok(Redirect::to("/"))
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(session: Session) -> impl IntoResponse {
    RegisterTemplate {
        ctx: PageContext::load(&session).await,
        title: "Register".to_owned(),
        name: String::new(),
        email: String::new(),
    }
}

/// Re-render the register form with `errors` and the submitted values.
async fn register_again(session: &Session, form: &RegisterForm, errors: Vec<String>) -> Response {
    let mut ctx = PageContext::load(session).await;
    ctx.flashes.extend(errors.into_iter().map(Flash::error));

    RegisterTemplate {
        ctx,
        title: "Register".to_owned(),
        name: form.name.clone(),
        email: form.email.clone(),
    }
    .into_response()
}

/// Handle registration; a new account is logged in straight away.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let valid = match validate_register(&form) {
        Ok(valid) => valid,
        Err(errors) => return Ok(register_again(&session, &form, errors).await),
    };

    match state
        .auth()
        .register(&valid.name, &valid.email, &form.password)
        .await
    {
        Ok(user) => {
            log_in(&session, &user).await?;
            flash(&session, Flash::success("You are now logged in!")).await;
            Ok(Redirect::to("/").into_response())
        }
        Err(AuthError::UserAlreadyExists) => Ok(register_again(
            &session,
            &form,
            vec!["A user with the given email is already registered".to_owned()],
        )
        .await),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Password Reset Routes
// =============================================================================

/// Email a reset link to the account registered under the submitted address.
pub async fn forgot(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Redirect> {
    let (user, reset) = match state
        .auth()
        .start_password_reset(&form.email, Utc::now())
        .await
    {
        Ok(found) => found,
        Err(AuthError::UserNotFound) => {
            flash(&session, Flash::error("No account with that email exists.")).await;
            return Ok(Redirect::to("/login"));
        }
        Err(e) => return Err(e.into()),
    };

    let reset_url = format!("{}/account/reset/{}", state.config().base_url, reset.token);
    let mail = OutgoingMail::password_reset(&user.email, &user.name, &reset_url)?;
    state.mailer().send(mail).await?;

    flash(
        &session,
        Flash::success("You have been emailed a password reset link."),
    )
    .await;
    Ok(Redirect::to("/login"))
}

/// Show the new-password form for a live token.
pub async fn reset_page(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Response> {
    match state.auth().user_for_reset_token(&token, Utc::now()).await {
        Ok(_) => Ok(ResetPasswordTemplate {
            ctx: PageContext::load(&session).await,
            title: "Reset your Password".to_owned(),
            token,
        }
        .into_response()),
        Err(AuthError::InvalidResetToken) => {
            flash(
                &session,
                Flash::error("Password reset is invalid or has expired"),
            )
            .await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Set a new password from a live token and log the user in.
pub async fn reset(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(token): Path<String>,
    Form(form): Form<PasswordForm>,
) -> Result<Redirect> {
    let reset_url = format!("/account/reset/{token}");

    if !form.passwords_match() {
        flash(&session, Flash::error("Passwords do not match!")).await;
        return Ok(redirect_back(&headers, &reset_url));
    }

    match state
        .auth()
        .reset_password(&token, &form.password, Utc::now())
        .await
    {
        Ok(user) => {
            log_in(&session, &user).await?;
            flash(
                &session,
                Flash::success("Your password has been reset! You are now logged in!"),
            )
            .await;
            Ok(Redirect::to("/"))
        }
        Err(AuthError::InvalidResetToken) => {
            flash(
                &session,
                Flash::error("Password reset is invalid or has expired"),
            )
            .await;
            Ok(Redirect::to("/login"))
        }
        Err(AuthError::WeakPassword(_)) => {
            flash(&session, Flash::error(PASSWORD_BLANK)).await;
            Ok(redirect_back(&headers, &reset_url))
        }
        Err(e) => Err(e.into()),
    }
}
