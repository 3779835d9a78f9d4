use serde::{Deserialize, Serialize};

use crate::store::models::Listing;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub user_id: Option<String>,
    pub property_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub user_id: Option<String>,
    pub property_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SavedState {
    pub saved: bool,
}

/// `GET /saved` answers with one state when a listing is named, otherwise the list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SavedResponse {
    State(SavedState),
    Listings(Vec<Listing>),
}
