use crate::state::AppState;
use axum::Router;

pub mod capability;
pub mod dto;
pub mod handlers;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::admin_routes())
}
