use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::models::AdminSecret;

#[derive(Debug, Default, Deserialize)]
pub struct AdminAuthRequest {
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminAuthResponse {
    pub success: bool,
    pub token: String,
    pub bootstrap: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSecretRequest {
    pub label: Option<String>,
    pub secret: Option<String>,
}

/// Admin-secret record as returned to clients, without the hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSecretView {
    pub id: String,
    pub label: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<AdminSecret> for AdminSecretView {
    fn from(s: AdminSecret) -> Self {
        Self {
            id: s.id,
            label: s.label,
            created_at: s.created_at,
        }
    }
}
