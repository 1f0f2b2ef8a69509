//! Account route handlers: register, login, logout and profile.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user};
use crate::middleware::{BearerToken, RequireAuth};
use crate::models::user::{LoginInput, ProfileInput, RegisterInput};
use crate::models::{TokenGrant, User};
use crate::routes::ApiJson;
use crate::services::AuthService;
use crate::state::AppState;

/// Body of `POST /profile`.
#[derive(Debug, Serialize)]
pub struct ProfileUpdated {
    pub message: &'static str,
    pub user: User,
}

/// Create an account and sign in.
#[instrument(skip(state, input))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> Result<(StatusCode, Json<TokenGrant>)> {
    let grant = AuthService::new(state.store()).register(&input).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// Exchange email and password for a bearer token.
#[instrument(skip(state, input))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginInput>,
) -> Result<Json<TokenGrant>> {
    let grant = AuthService::new(state.store()).login(&input).await?;
    Ok(Json(grant))
}

/// Revoke the presented token.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    BearerToken(token): BearerToken,
) -> Result<StatusCode> {
    AuthService::new(state.store()).logout(&token).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's profile.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn current_user(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<User>> {
    let user = AuthService::new(state.store()).get_user(user.id).await?;
    Ok(Json(user))
}

/// Change the caller's name and/or email.
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<ProfileInput>,
) -> Result<Json<ProfileUpdated>> {
    let user = AuthService::new(state.store())
        .update_profile(user.id, &input)
        .await?;
    Ok(Json(ProfileUpdated {
        message: "Profile updated",
        user,
    }))
}
