//! Review submission.

use axum::{
    Form,
    extract::{Path, State},
    http::HeaderMap,
    response::Redirect,
};
use tower_sessions::Session;

use storedir_core::StoreId;

use crate::error::Result;
use crate::middleware::{Flash, FlashKind, RequireAuth};
use crate::state::AppState;
use crate::validation::{ReviewForm, validate_review};

use super::{flash, flash_all, redirect_back};

/// Leave a review on store `id`, then go back to where the form was.
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Form(form): Form<ReviewForm>,
) -> Result<Redirect> {
    let review = match validate_review(&form) {
        Ok(review) => review,
        Err(errors) => {
            flash_all(&session, FlashKind::Error, errors).await;
            return Ok(redirect_back(&headers, "/stores"));
        }
    };

    state
        .stores()
        .add_review(user.id, StoreId::new(id), &review)
        .await?;

    flash(&session, Flash::success("Review Saved!")).await;
    Ok(redirect_back(&headers, "/stores"))
}
