use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::service::generate_prompt;
use crate::{
    auth::{extractors::AuthUser, services::current_identity},
    error::AppError,
    state::AppState,
    store::PromptEntry,
};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub entry: PromptEntry,
    pub credits: i64,
    pub remaining_requests: usize,
}

pub fn prompt_routes() -> Router<AppState> {
    Router::new().route("/prompts", get(list_history).post(create_prompt))
}

#[instrument(skip(state, payload))]
pub async fn create_prompt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let generated = generate_prompt(&state, user_id, &payload.kind, &payload.description).await?;
    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            entry: generated.entry,
            credits: generated.credits,
            remaining_requests: state.limiter.get_remaining_requests(&user_id.to_string()),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<PromptEntry>>, AppError> {
    current_identity(&state, user_id).await?;
    let history = state.store.get_user_history(user_id).await?;
    Ok(Json(history))
}
