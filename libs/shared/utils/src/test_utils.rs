use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{Database, MemoryDatabase};
use shared_models::auth::{Role, TokenType, User};

use crate::jwt::issue_token;
use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            access_token_ttl_minutes: 60,
            refresh_token_ttl_hours: 24,
            redis_url: None,
            notification_webhook_url: None,
            notification_workers: 1,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }

    /// State backed by a fresh in-memory store.
    pub fn to_state(&self) -> AppState {
        AppState::new(self.to_arc(), Arc::new(MemoryDatabase::new()))
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(username: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role,
        }
    }

    pub fn doctor(username: &str) -> Self {
        Self::new(username, Role::Doctor)
    }

    pub fn patient(username: &str) -> Self {
        Self::new(username, Role::Patient)
    }

    pub fn admin(username: &str) -> Self {
        Self::new(username, Role::Admin)
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Store an active account row for this user so registries that check
    /// the owning account can find it.
    pub async fn seed_account(&self, state: &AppState, first_name: &str, last_name: &str) -> User {
        let now = Utc::now();
        state
            .db
            .insert(
                "accounts",
                json!({
                    "id": self.id,
                    "username": self.username,
                    "email": self.email,
                    "password_hash": "",
                    "first_name": first_name,
                    "last_name": last_name,
                    "role": self.role,
                    "phone_number": null,
                    "address": null,
                    "date_of_birth": null,
                    "is_active": true,
                    "created_at": now,
                    "updated_at": now,
                }),
            )
            .await
            .expect("account row should be stored");
        self.to_user()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            username: Some(self.username.clone()),
            email: Some(self.email.clone()),
            role: self.role,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        issue_token(
            &user.to_user(),
            TokenType::Access,
            Duration::hours(exp_hours.unwrap_or(24)),
            secret,
        )
        .expect("test token should be issued")
    }

    pub fn create_refresh_token(user: &TestUser, secret: &str) -> String {
        issue_token(&user.to_user(), TokenType::Refresh, Duration::hours(24), secret)
            .expect("test token should be issued")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}
