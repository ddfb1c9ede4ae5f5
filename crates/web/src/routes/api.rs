//! JSON endpoints used by the typeahead, the map and the heart buttons.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use storedir_core::{GeoPoint, StoreId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{NearbyStore, SearchHit, User};
use crate::state::AppState;

/// `?q=` for the search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `?lng=&lat=` for the nearby endpoint.
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lng: Option<f64>,
    pub lat: Option<f64>,
}

/// Full-text search over names and descriptions.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>> {
    Ok(Json(state.stores().search(&query.q).await?))
}

/// Stores near a point, nearest first.
pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<NearbyStore>>> {
    let (Some(lng), Some(lat)) = (query.lng, query.lat) else {
        return Err(AppError::BadRequest(
            "lng and lat query parameters are required".to_owned(),
        ));
    };
    let point = GeoPoint::new(lng, lat).map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(state.stores().near(point).await?))
}

/// Heart or un-heart a store; answers with the updated user.
pub async fn heart(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<User>> {
    let user = state
        .stores()
        .toggle_heart(user.id, StoreId::new(id))
        .await?;
    Ok(Json(user))
}
