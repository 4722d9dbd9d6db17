use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::query::Query;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique or exclusion constraint violation reported by the backend.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => AppError::NotFound(msg),
            DatabaseError::Conflict(msg) => AppError::Conflict(msg),
            DatabaseError::Auth(msg) => AppError::ExternalService(format!("Storage rejected credentials: {}", msg)),
            other => AppError::Database(other.to_string()),
        }
    }
}

/// Table-oriented storage: CRUD plus filtered reads. Rows are JSON objects
/// keyed by column name with a `id` primary key.
#[async_trait]
pub trait Database: Send + Sync {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, DatabaseError>;

    /// Insert several rows as one write; either all rows are stored or none.
    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DatabaseError>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DatabaseError>;

    /// Apply `changes` to the row with the given id and return the updated row.
    async fn update(&self, table: &str, id: Uuid, changes: Value) -> Result<Option<Value>, DatabaseError>;

    async fn delete(&self, table: &str, id: Uuid) -> Result<bool, DatabaseError>;
}

pub async fn fetch_all<T: DeserializeOwned>(
    db: &dyn Database,
    table: &str,
    query: &Query,
) -> Result<Vec<T>, DatabaseError> {
    let rows = db.select(table, query).await?;
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DatabaseError::from))
        .collect()
}

pub async fn fetch_one<T: DeserializeOwned>(
    db: &dyn Database,
    table: &str,
    query: &Query,
) -> Result<Option<T>, DatabaseError> {
    let query = query.clone().limit(1);
    let mut rows = fetch_all::<T>(db, table, &query).await?;
    Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
}

pub async fn fetch_by_id<T: DeserializeOwned>(
    db: &dyn Database,
    table: &str,
    id: Uuid,
) -> Result<Option<T>, DatabaseError> {
    fetch_one(db, table, &Query::by_id(id.to_string())).await
}

pub async fn insert_as<T: DeserializeOwned>(
    db: &dyn Database,
    table: &str,
    row: Value,
) -> Result<T, DatabaseError> {
    let stored = db.insert(table, row).await?;
    Ok(serde_json::from_value(stored)?)
}

pub async fn update_as<T: DeserializeOwned>(
    db: &dyn Database,
    table: &str,
    id: Uuid,
    changes: Value,
) -> Result<Option<T>, DatabaseError> {
    match db.update(table, id, changes).await? {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}
