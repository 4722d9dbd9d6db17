use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::{fetch_all, fetch_by_id, fetch_one, insert_as, update_as};
use shared_database::{Condition, Database, DatabaseError, Query};
use shared_models::auth::{Role, TokenPair, TokenType};
use shared_models::error::AppError;
use shared_utils::jwt::{issue_token, validate_token};
use shared_utils::AppState;

use crate::models::{
    Account, AccountListQuery, RegisterRequest, UpdateProfileRequest, ACCOUNTS_TABLE,
};
use crate::services::password::{hash_password, is_valid_email, verify_password, MIN_PASSWORD_LENGTH};

pub struct AccountService {
    db: Arc<dyn Database>,
    config: Arc<AppConfig>,
}

impl AccountService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            config: state.config.clone(),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Account, AppError> {
        debug!("Registering account: {}", request.username);

        let username = request.username.trim();
        if username.is_empty() {
            return Err(AppError::ValidationError("Username is required".to_string()));
        }
        if !is_valid_email(&request.email) {
            return Err(AppError::ValidationError("Enter a valid email address".to_string()));
        }
        if request.password != request.password2 {
            return Err(AppError::ValidationError("Password fields didn't match".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::ValidationError(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }
        if request.role == Role::Admin {
            return Err(AppError::ValidationError("Admin accounts cannot self-register".to_string()));
        }

        if self.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(format!("Username '{}' is already taken", username)));
        }

        let password_hash = hash_password(&request.password)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

        let now = Utc::now();
        let row = json!({
            "id": Uuid::new_v4(),
            "username": username,
            "email": request.email,
            "password_hash": password_hash,
            "first_name": request.first_name,
            "last_name": request.last_name,
            "role": request.role,
            "phone_number": request.phone_number,
            "address": request.address,
            "date_of_birth": request.date_of_birth,
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        let account: Account = insert_as(self.db.as_ref(), ACCOUNTS_TABLE, row).await?;
        info!("Registered {} account {}", account.role, account.id);
        Ok(account)
    }

    /// Check credentials and return a fresh access/refresh pair.
    pub async fn obtain_tokens(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        debug!("Issuing tokens for: {}", username);

        let invalid = || AppError::Auth("No active account found with the given credentials".to_string());

        let account = self.find_by_username(username).await?.ok_or_else(invalid)?;
        if !account.is_active {
            warn!("Login attempt for inactive account {}", account.id);
            return Err(invalid());
        }

        let matches = verify_password(password, &account.password_hash)
            .map_err(|e| AppError::Internal(format!("Stored password hash is invalid: {}", e)))?;
        if !matches {
            return Err(invalid());
        }

        self.token_pair(&account)
    }

    pub async fn refresh_access_token(&self, refresh: &str) -> Result<String, AppError> {
        let claims_user = validate_token(refresh, &self.config.jwt_secret, TokenType::Refresh)
            .map_err(AppError::Auth)?;

        let account = self
            .get_account(claims_user.id)
            .await
            .map_err(|_| AppError::Auth("Account no longer exists".to_string()))?;
        if !account.is_active {
            return Err(AppError::Auth("Account is disabled".to_string()));
        }

        issue_token(
            &account.to_user(),
            TokenType::Access,
            Duration::minutes(self.config.access_token_ttl_minutes),
            &self.config.jwt_secret,
        )
        .map_err(AppError::Internal)
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account, AppError> {
        fetch_by_id(self.db.as_ref(), ACCOUNTS_TABLE, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    pub async fn update_profile(&self, id: Uuid, request: UpdateProfileRequest) -> Result<Account, AppError> {
        debug!("Updating profile for account: {}", id);

        let mut update_data = Map::new();

        if let Some(first_name) = request.first_name {
            update_data.insert("first_name".to_string(), json!(first_name));
        }
        if let Some(last_name) = request.last_name {
            update_data.insert("last_name".to_string(), json!(last_name));
        }
        if let Some(email) = request.email {
            if !is_valid_email(&email) {
                return Err(AppError::ValidationError("Enter a valid email address".to_string()));
            }
            update_data.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = request.phone_number {
            update_data.insert("phone_number".to_string(), json!(phone));
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), json!(address));
        }
        if let Some(dob) = request.date_of_birth {
            update_data.insert("date_of_birth".to_string(), json!(dob));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now()));

        update_as(self.db.as_ref(), ACCOUNTS_TABLE, id, Value::Object(update_data))
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    pub async fn list_accounts(&self, params: AccountListQuery) -> Result<Vec<Account>, AppError> {
        let mut query = Query::new();

        if let Some(role) = params.role {
            query = query.eq("role", role.as_str());
        }
        if let Some(term) = params.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.or(vec![
                Condition::ilike("username", term),
                Condition::ilike("email", term),
                Condition::ilike("first_name", term),
                Condition::ilike("last_name", term),
            ]);
        }

        let query = query
            .ordering(params.ordering.as_deref(), &["created_at", "username"])
            .map_err(AppError::ValidationError)?
            .paginate(params.limit, params.offset);

        Ok(fetch_all(self.db.as_ref(), ACCOUNTS_TABLE, &query).await?)
    }

    /// Accounts whose first or last name contains `term`; used by other
    /// registries to search by person name.
    pub async fn find_ids_by_name(db: &dyn Database, term: &str) -> Result<Vec<Uuid>, DatabaseError> {
        let query = Query::new().or(vec![
            Condition::ilike("first_name", term),
            Condition::ilike("last_name", term),
        ]);
        let accounts: Vec<Account> = fetch_all(db, ACCOUNTS_TABLE, &query).await?;
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AppError> {
        Ok(fetch_one(self.db.as_ref(), ACCOUNTS_TABLE, &Query::new().eq("username", username)).await?)
    }

    fn token_pair(&self, account: &Account) -> Result<TokenPair, AppError> {
        let user = account.to_user();
        let access = issue_token(
            &user,
            TokenType::Access,
            Duration::minutes(self.config.access_token_ttl_minutes),
            &self.config.jwt_secret,
        )
        .map_err(AppError::Internal)?;
        let refresh = issue_token(
            &user,
            TokenType::Refresh,
            Duration::hours(self.config.refresh_token_ttl_hours),
            &self.config.jwt_secret,
        )
        .map_err(AppError::Internal)?;

        Ok(TokenPair { access, refresh })
    }
}
