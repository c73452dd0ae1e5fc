use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{
        AuthResponse, LoginRequest, PublicUser, RateLimitStatus, RefreshRequest,
        RegisterRequest, UpdateProfileRequest,
    },
    extractors::AuthUser,
    services,
};
use crate::{error::AppError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me))
        .route("/me/rate-limit", get(rate_limit_status))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (user, tokens) =
        services::sign_up(&state, &payload.name, &payload.email, &payload.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, tokens) = services::sign_in(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, tokens) = services::refresh(&state, &payload.refresh_token).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

/// Tokens are stateless; the client drops them. This only confirms the token was valid.
#[instrument]
pub async fn logout(AuthUser(user_id): AuthUser) -> StatusCode {
    info!(%user_id, "user logged out");
    StatusCode::NO_CONTENT
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::current_identity(&state, user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::update_profile(
        &state,
        user_id,
        payload.name.as_deref(),
        payload.password.as_deref(),
    )
    .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn rate_limit_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<RateLimitStatus> {
    let key = user_id.to_string();
    Json(RateLimitStatus {
        limit: state.limiter.max_requests(),
        remaining: state.limiter.get_remaining_requests(&key),
        reset_in_secs: state.limiter.get_reset_time(&key),
    })
}
