use assert_matches::assert_matches;
use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::Authorization;

use auth_cell::handlers::{
    get_profile, list_accounts, obtain_token, refresh_token, register, update_profile, verify_token,
};
use auth_cell::models::{AccountListQuery, RefreshRequest, RegisterRequest, TokenRequest, UpdateProfileRequest};
use shared_models::auth::{Role, TokenType};
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use shared_utils::AppState;

fn registration(username: &str, role: Role) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: "s3cure-passw0rd".to_string(),
        password2: "s3cure-passw0rd".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        role,
        phone_number: None,
        address: None,
        date_of_birth: None,
    }
}

async fn register_and_login(state: &AppState, username: &str, role: Role) -> (String, String) {
    register(State(state.clone()), Json(registration(username, role))).await.unwrap();
    let pair = obtain_token(
        State(state.clone()),
        Json(TokenRequest { username: username.to_string(), password: "s3cure-passw0rd".to_string() }),
    )
    .await
    .unwrap()
    .0;
    (pair.access, pair.refresh)
}

#[tokio::test]
async fn test_register_creates_account_without_exposing_hash() {
    let state = TestConfig::default().to_state();

    let (status, Json(account)) = register(State(state), Json(registration("jane", Role::Patient)))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account.role, Role::Patient);
    assert!(account.is_active);

    let body = serde_json::to_value(&account).unwrap();
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords() {
    let state = TestConfig::default().to_state();
    let mut request = registration("jane", Role::Patient);
    request.password2 = "something-else".to_string();

    let result = register(State(state), Json(request)).await;
    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("didn't match"));
}

#[tokio::test]
async fn test_register_rejects_admin_role_and_short_password() {
    let state = TestConfig::default().to_state();

    let result = register(State(state.clone()), Json(registration("root", Role::Admin))).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));

    let mut request = registration("shorty", Role::Patient);
    request.password = "short".to_string();
    request.password2 = "short".to_string();
    let result = register(State(state), Json(request)).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_register_rejects_duplicate_username() {
    let state = TestConfig::default().to_state();
    register(State(state.clone()), Json(registration("jane", Role::Patient))).await.unwrap();

    let result = register(State(state), Json(registration("jane", Role::Doctor))).await;
    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_login_then_profile_access() {
    let config = TestConfig::default();
    let state = config.to_state();
    let (access, _) = register_and_login(&state, "jane", Role::Patient).await;

    let user = validate_token(&access, &config.jwt_secret, TokenType::Access).unwrap();
    let Json(profile) = get_profile(State(state.clone()), Extension(user.clone())).await.unwrap();
    assert_eq!(profile.username, "jane");

    let Json(updated) = update_profile(
        State(state),
        Extension(user),
        Json(UpdateProfileRequest { phone_number: Some("+15550100".to_string()), ..Default::default() }),
    )
    .await
    .unwrap();
    assert_eq!(updated.phone_number.as_deref(), Some("+15550100"));
    assert_eq!(updated.first_name, "Jane");
}

#[tokio::test]
async fn test_login_with_wrong_password_fails() {
    let state = TestConfig::default().to_state();
    register(State(state.clone()), Json(registration("jane", Role::Patient))).await.unwrap();

    let result = obtain_token(
        State(state),
        Json(TokenRequest { username: "jane".to_string(), password: "not-the-password".to_string() }),
    )
    .await;
    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_refresh_accepts_refresh_tokens_only() {
    let config = TestConfig::default();
    let state = config.to_state();
    let (access, refresh) = register_and_login(&state, "jane", Role::Patient).await;

    let Json(response) = refresh_token(State(state.clone()), Json(RefreshRequest { refresh }))
        .await
        .unwrap();
    assert!(validate_token(&response.access, &config.jwt_secret, TokenType::Access).is_ok());

    let result = refresh_token(State(state), Json(RefreshRequest { refresh: access })).await;
    assert_matches!(result, Err(AppError::Auth(msg)) if msg == "Wrong token type");
}

#[tokio::test]
async fn test_verify_reports_validity() {
    let config = TestConfig::default();
    let state = config.to_state();
    let user = TestUser::patient("jane");

    let good = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));
    let Json(body) = verify_token(State(state.clone()), TypedHeader(Authorization::bearer(&good).unwrap())).await;
    assert_eq!(body["valid"], true);

    let expired = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);
    let Json(body) = verify_token(State(state), TypedHeader(Authorization::bearer(&expired).unwrap())).await;
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_account_directory_is_admin_only_and_filterable() {
    let state = TestConfig::default().to_state();
    register(State(state.clone()), Json(registration("jane", Role::Patient))).await.unwrap();
    register(State(state.clone()), Json(registration("house", Role::Doctor))).await.unwrap();

    let doctor = TestUser::doctor("house").to_user();
    let result = list_accounts(State(state.clone()), Extension(doctor), Query(AccountListQuery::default())).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let admin = TestUser::admin("root").to_user();
    let Json(doctors) = list_accounts(
        State(state.clone()),
        Extension(admin.clone()),
        Query(AccountListQuery { role: Some(Role::Doctor), ..Default::default() }),
    )
    .await
    .unwrap();
    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0].username, "house");

    let Json(ordered) = list_accounts(
        State(state),
        Extension(admin),
        Query(AccountListQuery { ordering: Some("-username".to_string()), ..Default::default() }),
    )
    .await
    .unwrap();
    let names: Vec<&str> = ordered.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["jane", "house"]);
}
