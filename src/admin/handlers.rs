use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::services;
use crate::{
    auth::{dto::PublicUser, extractors::AdminUser},
    error::AppError,
    state::AppState,
    store::SystemMetrics,
};

#[derive(Debug, Deserialize)]
pub struct CreditAdjustment {
    pub amount: i64,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/credits", patch(adjust_credits))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/metrics", get(metrics))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = services::list_users(&state).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn adjust_credits(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<CreditAdjustment>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::adjust_credits(&state, &admin.0, &id, payload.amount).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    services::delete_user(&state, &admin.0, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, _admin))]
pub async fn metrics(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<SystemMetrics>, AppError> {
    Ok(Json(services::metrics(&state).await?))
}
