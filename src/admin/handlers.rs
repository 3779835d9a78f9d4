use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    admin::{
        capability::{AdminCapability, AdminKeys},
        dto::{AdminAuthRequest, AdminAuthResponse, AdminSecretView, CreateSecretRequest},
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/auth", post(authenticate))
        .route("/admin/secrets", post(create_secret))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    payload: Result<Json<AdminAuthRequest>, JsonRejection>,
) -> Result<Json<AdminAuthResponse>, AppError> {
    let Json(payload) = payload?;
    let grant = services::verify_admin_secret(&state, payload.secret).await?;
    let token = services::issue_token(&AdminKeys::from_ref(&state), grant)?;
    Ok(Json(AdminAuthResponse {
        success: true,
        token,
        bootstrap: grant.bootstrap,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_secret(
    State(state): State<AppState>,
    _admin: AdminCapability,
    payload: Result<Json<CreateSecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdminSecretView>), AppError> {
    let Json(payload) = payload?;
    let view = services::create_admin_secret(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}
