use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppError,
    saved::{
        dto::{SavedQuery, SavedResponse, SavedState, ToggleRequest},
        services,
    },
    state::AppState,
};

pub fn saved_routes() -> Router<AppState> {
    Router::new().route("/saved", get(get_saved).post(toggle_saved))
}

#[instrument(skip(state, query))]
pub async fn get_saved(
    State(state): State<AppState>,
    query: Result<Query<SavedQuery>, QueryRejection>,
) -> Result<Json<SavedResponse>, AppError> {
    let Query(query) = query?;
    Ok(Json(services::lookup(&state, query).await?))
}

#[instrument(skip(state, payload))]
pub async fn toggle_saved(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<SavedState>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(services::toggle(&state, payload).await?))
}
