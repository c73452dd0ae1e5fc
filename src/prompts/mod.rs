use crate::state::AppState;
use axum::Router;

pub mod generator;
pub mod handlers;
pub mod service;
pub mod template;

pub fn router() -> Router<AppState> {
    handlers::prompt_routes()
}
