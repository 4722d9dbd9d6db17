use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_models::auth::{TokenPair, TokenType, User};
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;
use shared_utils::policy::{authorize, Action, Resource};
use shared_utils::AppState;

use crate::models::{
    AccessTokenResponse, Account, AccountListQuery, RefreshRequest, RegisterRequest, TokenRequest,
    UpdateProfileRequest,
};
use crate::services::account::AccountService;

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = AccountService::new(&state).register(request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[axum::debug_handler]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let pair = AccountService::new(&state)
        .obtain_tokens(&request.username, &request.password)
        .await?;
    Ok(Json(pair))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, AppError> {
    let access = AccountService::new(&state).refresh_access_token(&request.refresh).await?;
    Ok(Json(AccessTokenResponse { access }))
}

#[axum::debug_handler]
pub async fn verify_token(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Json<Value> {
    debug!("Verifying token");

    let valid = validate_token(auth.token(), &state.config.jwt_secret, TokenType::Access).is_ok();
    Json(json!({ "valid": valid }))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Account>, AppError> {
    authorize(&user, Resource::Profile, Action::Read)?;
    debug!("Getting profile for user: {}", user.id);

    let account = AccountService::new(&state).get_account(user.id).await?;
    Ok(Json(account))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Account>, AppError> {
    authorize(&user, Resource::Profile, Action::Update)?;

    let account = AccountService::new(&state).update_profile(user.id, request).await?;
    Ok(Json(account))
}

#[axum::debug_handler]
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<AccountListQuery>,
) -> Result<Json<Vec<Account>>, AppError> {
    authorize(&user, Resource::AccountDirectory, Action::List)?;

    let accounts = AccountService::new(&state).list_accounts(params).await?;
    Ok(Json(accounts))
}
