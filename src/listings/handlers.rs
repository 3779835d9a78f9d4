use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    admin::{capability::AdminCapability, services::ensure_admin},
    error::AppError,
    listings::{
        dto::{ListingPayload, ListingQuery},
        services,
    },
    state::AppState,
    store::models::Listing,
};

pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/properties", get(list_listings).post(create_listing))
        .route(
            "/properties/:id",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
}

#[instrument(skip(state, query))]
pub async fn list_listings(
    State(state): State<AppState>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> Result<Json<Vec<Listing>>, AppError> {
    let Query(query) = query?;
    Ok(Json(services::list(&state, query).await?))
}

#[instrument(skip(state))]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(services::get(&state, &id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_listing(
    State(state): State<AppState>,
    payload: Result<Json<ListingPayload>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<Listing>), AppError> {
    let Json(payload) = payload?;
    let listing = services::create(&state, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/properties/{}", listing.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(listing)))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_listing(
    State(state): State<AppState>,
    admin: Option<AdminCapability>,
    Path(id): Path<String>,
    payload: Result<Json<ListingPayload>, JsonRejection>,
) -> Result<Json<Listing>, AppError> {
    ensure_admin(&state, admin.as_ref())?;
    let Json(payload) = payload?;
    Ok(Json(services::update(&state, &id, payload).await?))
}

#[instrument(skip(state, admin))]
pub async fn delete_listing(
    State(state): State<AppState>,
    admin: Option<AdminCapability>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_admin(&state, admin.as_ref())?;
    services::delete(&state, &id).await?;
    Ok(Json(json!({ "success": true })))
}
