use tracing::info;

use crate::error::AppError;
use crate::saved::dto::{SavedQuery, SavedResponse, SavedState, ToggleRequest};
use crate::state::AppState;

fn id(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn lookup(st: &AppState, query: SavedQuery) -> Result<SavedResponse, AppError> {
    let Some(user_id) = id(query.user_id) else {
        return Err(AppError::validation("User ID required"));
    };

    match id(query.property_id) {
        Some(listing_id) => {
            let saved = st.store.saved.is_saved(&user_id, &listing_id).await?;
            Ok(SavedResponse::State(SavedState { saved }))
        }
        None => {
            let listings = st.store.saved.list_for_user(&user_id).await?;
            Ok(SavedResponse::Listings(listings))
        }
    }
}

pub async fn toggle(st: &AppState, req: ToggleRequest) -> Result<SavedState, AppError> {
    let (Some(user_id), Some(listing_id)) = (id(req.user_id), id(req.property_id)) else {
        return Err(AppError::validation("Missing IDs"));
    };

    let saved = st
        .store
        .saved
        .toggle(&user_id, &listing_id)
        .await
        .map_err(|e| AppError::from_store("Property", e))?;

    info!(%user_id, %listing_id, saved, "bookmark toggled");
    Ok(SavedState { saved })
}
