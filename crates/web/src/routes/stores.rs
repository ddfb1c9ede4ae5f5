//! Store listing, detail, form, tag, hearts and top-store handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use storedir_core::{StoreId, UserId};

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Flash, FlashKind, PageContext, RequireAuth};
use crate::models::{
    CurrentUser, Store, StoreDetail, StoreDraft, TAG_CHOICES, TagCount, TopStore,
};
use crate::services::{StoreError, StorePage, uploads::extension_for};
use crate::state::AppState;
use crate::validation::{StoreFields, validate_store};

use super::{flash, flash_all};

/// Flash shown when someone other than the author tries to edit a store.
pub const NOT_OWNER_MESSAGE: &str = "You must own a store in order to edit it!";

// =============================================================================
// View Types
// =============================================================================

/// A store as a listing card, with the viewer's heart state and edit right.
#[derive(Debug, Clone)]
pub struct StoreCard {
    pub store: Store,
    pub hearted: bool,
    pub editable: bool,
}

impl StoreCard {
    fn build(stores: Vec<Store>, hearts: &[StoreId], viewer: Option<UserId>) -> Vec<Self> {
        stores
            .into_iter()
            .map(|store| {
                let hearted = hearts.contains(&store.id);
                let editable = can_edit(&store, viewer);
                Self {
                    store,
                    hearted,
                    editable,
                }
            })
            .collect()
    }
}

/// Pagination links for the listing.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: i64,
    pub pages: i64,
    pub count: i64,
}

impl Pagination {
    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

/// Values shown in the store form, as strings so a blank form renders cleanly.
#[derive(Debug, Clone, Default)]
pub struct StoreFormValues {
    pub name: String,
    pub description: String,
    pub address: String,
    pub lng: String,
    pub lat: String,
    pub tags: Vec<String>,
    pub photo_url: Option<String>,
}

impl StoreFormValues {
    /// Whether the tag checkbox should start checked.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl From<&Store> for StoreFormValues {
    fn from(store: &Store) -> Self {
        Self {
            name: store.name.clone(),
            description: store.description.clone(),
            address: store.location.address.clone(),
            lng: store.location.point.lng().to_string(),
            lat: store.location.point.lat().to_string(),
            tags: store.tags.clone(),
            photo_url: store.cover_photo().map(|_| store.cover_photo_url()),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Store listing; also used for the hearted stores page.
#[derive(Template, WebTemplate)]
#[template(path = "stores.html")]
pub struct StoresTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub cards: Vec<StoreCard>,
    pub pagination: Option<Pagination>,
}

/// Single store with its reviews.
#[derive(Template, WebTemplate)]
#[template(path = "store.html")]
pub struct StoreTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub detail: StoreDetail,
    pub hearted: bool,
    pub can_edit: bool,
}

/// Add / edit store form.
#[derive(Template, WebTemplate)]
#[template(path = "edit_store.html")]
pub struct EditStoreTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub action: String,
    pub form: StoreFormValues,
    pub choices: &'static [&'static str],
}

/// Stores grouped by tag.
#[derive(Template, WebTemplate)]
#[template(path = "tags.html")]
pub struct TagsTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub current: Option<String>,
    pub tags: Vec<TagCount>,
    pub cards: Vec<StoreCard>,
}

impl TagsTemplate {
    /// Whether `tag` is the one being filtered on.
    #[must_use]
    pub fn is_current(&self, tag: &str) -> bool {
        self.current.as_deref() == Some(tag)
    }
}

/// Best-rated stores.
#[derive(Template, WebTemplate)]
#[template(path = "top.html")]
pub struct TopTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub stores: Vec<TopStore>,
}

/// Map of nearby stores; data is fetched from `/api/stores/near`.
#[derive(Template, WebTemplate)]
#[template(path = "map.html")]
pub struct MapTemplate {
    pub ctx: PageContext,
    pub title: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Hearted store ids of the logged-in user, empty for guests.
async fn viewer_hearts(state: &AppState, user: Option<&CurrentUser>) -> Result<Vec<StoreId>> {
    let Some(user) = user else {
        return Ok(Vec::new());
    };

    match state.auth().get_user(user.id).await {
        Ok(user) => Ok(user.hearts),
        Err(crate::services::AuthError::UserNotFound) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// An uploaded photo that has not been resized or stored yet.
struct PhotoPart {
    content_type: String,
    bytes: Vec<u8>,
}

/// Read the store form out of a multipart body.
///
/// A non-image `photo` part is rejected before anything is stored; an empty
/// `photo` part means no new photo.
async fn read_store_form(mut multipart: Multipart) -> Result<(StoreFields, Option<PhotoPart>)> {
    let mut fields = StoreFields::default();
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();

        if name == "photo" {
            let content_type = field.content_type().unwrap_or_default().to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if bytes.is_empty() {
                continue;
            }
            extension_for(&content_type)?;
            photo = Some(PhotoPart {
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        match name.as_str() {
            "name" => fields.name = value,
            "description" => fields.description = value,
            "tags" => fields.tags.push(value),
            "address" => fields.address = value,
            "lng" => fields.lng = value,
            "lat" => fields.lat = value,
            _ => {}
        }
    }

    Ok((fields, photo))
}

/// Turn an ownership failure into the listing redirect; pass other errors on.
async fn not_owner_redirect(session: &Session, err: StoreError) -> Result<Response> {
    match err {
        StoreError::NotOwner => {
            flash(session, Flash::error(NOT_OWNER_MESSAGE)).await;
            Ok(Redirect::to("/stores").into_response())
        }
        other => Err(other.into()),
    }
}

/// Remove an uploaded photo whose store write failed.
async fn discard_photo(state: &AppState, draft: &StoreDraft) {
    if let Some(photo) = &draft.photo {
        state.photos().discard(photo).await;
    }
}

// =============================================================================
// Listing
// =============================================================================

/// First page of the listing.
pub async fn index(state: State<AppState>, session: Session) -> Result<Response> {
    render_page(state, session, 1).await
}

/// Page `page` of the listing.
pub async fn page(
    state: State<AppState>,
    session: Session,
    Path(page): Path<i64>,
) -> Result<Response> {
    render_page(state, session, page).await
}

async fn render_page(State(state): State<AppState>, session: Session, page: i64) -> Result<Response> {
    match state.stores().page(page).await? {
        StorePage::Overflow { requested, last } => {
            flash(
                &session,
                Flash::info(format!(
                    "You asked for page {requested}. But that doesn't exist. So I put you on page {last}"
                )),
            )
            .await;
            Ok(Redirect::to(&format!("/stores/page/{last}")).into_response())
        }
        StorePage::Page {
            stores,
            page,
            pages,
            count,
        } => {
            let ctx = PageContext::load(&session).await;
            let hearts = viewer_hearts(&state, ctx.user.as_ref()).await?;
            let cards = StoreCard::build(stores, &hearts, ctx.user.as_ref().map(|u| u.id));

            Ok(StoresTemplate {
                ctx,
                title: "Stores".to_owned(),
                cards,
                pagination: Some(Pagination { page, pages, count }),
            }
            .into_response())
        }
    }
}

/// A store's page.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<Response> {
    let detail = state.stores().detail(&slug).await?;

    let ctx = PageContext::load(&session).await;
    let hearts = viewer_hearts(&state, ctx.user.as_ref()).await?;
    let hearted = hearts.contains(&detail.store.id);
    let can_edit = can_edit(&detail.store, ctx.user.as_ref().map(|user| user.id));

    Ok(StoreTemplate {
        ctx,
        title: detail.store.name.clone(),
        detail,
        hearted,
        can_edit,
    }
    .into_response())
}

// =============================================================================
// Create / Edit
// =============================================================================

/// Blank store form.
pub async fn add_page(RequireAuth(_user): RequireAuth, session: Session) -> Response {
    EditStoreTemplate {
        ctx: PageContext::load(&session).await,
        title: "Add Store".to_owned(),
        action: "/add".to_owned(),
        form: StoreFormValues::default(),
        choices: TAG_CHOICES,
    }
    .into_response()
}

/// Create a store from the multipart form.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    multipart: Multipart,
) -> Result<Response> {
    let (fields, photo) = read_store_form(multipart).await?;

    let mut draft = match validate_store(&fields, None) {
        Ok(draft) => draft,
        Err(errors) => {
            flash_all(&session, FlashKind::Error, errors).await;
            return Ok(Redirect::to("/add").into_response());
        }
    };

    if let Some(photo) = photo {
        draft.photo = Some(state.photos().save(&photo.content_type, photo.bytes).await?);
    }

    let store = match state.stores().create(user.id, &draft).await {
        Ok(store) => store,
        Err(e) => {
            discard_photo(&state, &draft).await;
            return Err(e.into());
        }
    };

    flash(
        &session,
        Flash::success(format!(
            "Successfully Created {}. Care to leave a review?",
            store.name
        )),
    )
    .await;
    Ok(Redirect::to(&format!("/store/{}", store.slug)).into_response())
}

/// Edit form for a store the user authored.
pub async fn edit_page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Response> {
    let store = match state.stores().editable(StoreId::new(id), user.id).await {
        Ok(store) => store,
        Err(e) => return not_owner_redirect(&session, e).await,
    };

    Ok(EditStoreTemplate {
        ctx: PageContext::load(&session).await,
        title: format!("Edit {}", store.name),
        action: format!("/add/{}", store.id),
        form: StoreFormValues::from(&store),
        choices: TAG_CHOICES,
    }
    .into_response())
}

/// Update a store the user authored.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Response> {
    let id = StoreId::new(id);
    if let Err(e) = state.stores().editable(id, user.id).await {
        return not_owner_redirect(&session, e).await;
    }

    let (fields, photo) = read_store_form(multipart).await?;
    let edit_url = format!("/stores/{id}/edit");

    let mut draft = match validate_store(&fields, None) {
        Ok(draft) => draft,
        Err(errors) => {
            flash_all(&session, FlashKind::Error, errors).await;
            return Ok(Redirect::to(&edit_url).into_response());
        }
    };

    if let Some(photo) = photo {
        draft.photo = Some(state.photos().save(&photo.content_type, photo.bytes).await?);
    }

    let store = match state.stores().update(id, user.id, &draft).await {
        Ok(store) => store,
        Err(e) => {
            discard_photo(&state, &draft).await;
            return not_owner_redirect(&session, e).await;
        }
    };

    flash(
        &session,
        Flash::success(format!("Successfully updated {}.", store.name)),
    )
    .await;
    Ok(Redirect::to(&edit_url).into_response())
}

// =============================================================================
// Tags, Map, Hearts, Top
// =============================================================================

/// Every tagged store.
pub async fn tags(state: State<AppState>, session: Session) -> Result<Response> {
    render_tags(state, session, None).await
}

/// Stores carrying one tag.
pub async fn tag(
    state: State<AppState>,
    session: Session,
    Path(tag): Path<String>,
) -> Result<Response> {
    render_tags(state, session, Some(tag)).await
}

async fn render_tags(
    State(state): State<AppState>,
    session: Session,
    current: Option<String>,
) -> Result<Response> {
    let (stores, tags) = state.stores().by_tag(current.as_deref()).await?;

    let ctx = PageContext::load(&session).await;
    let hearts = viewer_hearts(&state, ctx.user.as_ref()).await?;
    let cards = StoreCard::build(stores, &hearts, ctx.user.as_ref().map(|u| u.id));

    Ok(TagsTemplate {
        ctx,
        title: current.clone().unwrap_or_else(|| "Tags".to_owned()),
        current,
        tags,
        cards,
    }
    .into_response())
}

/// The map page.
pub async fn map_page(session: Session) -> Response {
    MapTemplate {
        ctx: PageContext::load(&session).await,
        title: "Map".to_owned(),
    }
    .into_response()
}

/// Stores the user has hearted.
pub async fn hearts(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Response> {
    let stores = state.stores().hearts(user.id).await?;
    let ids: Vec<StoreId> = stores.iter().map(|store| store.id).collect();

    Ok(StoresTemplate {
        ctx: PageContext::load(&session).await,
        title: "Hearted Stores".to_owned(),
        cards: StoreCard::build(stores, &ids, Some(user.id)),
        pagination: None,
    }
    .into_response())
}

/// Best-rated stores.
pub async fn top(State(state): State<AppState>, session: Session) -> Result<Response> {
    let stores = state.stores().top().await?;

    Ok(TopTemplate {
        ctx: PageContext::load(&session).await,
        title: "Top Stores!".to_owned(),
        stores,
    }
    .into_response())
}

/// Whether `user` may see the edit link for `store`.
#[must_use]
pub fn can_edit(store: &Store, user: Option<UserId>) -> bool {
    user.is_some_and(|user| store.is_authored_by(user))
}
