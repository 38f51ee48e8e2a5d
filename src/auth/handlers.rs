use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, HealthResponse, LoginRequest, MessageResponse, PublicUser,
            RefreshRequest, RegisterRequest,
        },
        errors::AuthError,
        jwt::AuthUser,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout/:user_id", post(logout))
        .route("/auth/health", get(health))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.sessions.register(payload).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.sessions.login(payload).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.sessions.refresh(payload).await?;
    info!(user_id = %response.user.id, "token refreshed");
    Ok(Json(response))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.sessions.revoke(user_id).await?;
    Ok(Json(MessageResponse {
        message: "logged out".into(),
    }))
}

#[instrument(skip_all)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.sessions.profile(claims.sub).await?;
    Ok(Json(user))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "plandia-auth",
        status: "healthy",
        timestamp: OffsetDateTime::now_utc(),
    })
}
