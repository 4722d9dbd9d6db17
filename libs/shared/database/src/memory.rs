use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::query::{compare_values, Query};
use crate::store::{Database, DatabaseError};

/// Process-local store used when no PostgREST backend is configured, and in tests.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map(Vec::len).unwrap_or(0)
    }

    fn prepare_row(table: &str, mut row: Value) -> Result<Value, DatabaseError> {
        let object = row
            .as_object_mut()
            .ok_or_else(|| DatabaseError::InvalidRow(format!("Rows for {} must be JSON objects", table)))?;

        if !object.get("id").map(|id| !id.is_null()).unwrap_or(false) {
            object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        Ok(row)
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn sort_rows(rows: &mut [Value], query: &Query) {
    if query.order.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for order in &query.order {
            let left = a.get(&order.column).unwrap_or(&Value::Null);
            let right = b.get(&order.column).unwrap_or(&Value::Null);

            // Nulls sort last regardless of direction.
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => compare_values(left, right).unwrap_or(Ordering::Equal),
            };

            let ordering = if order.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, DatabaseError> {
        let row = Self::prepare_row(table, row)?;

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(id) = row_id(&row) {
            if rows.iter().any(|existing| row_id(existing) == Some(id)) {
                return Err(DatabaseError::Conflict(format!("Duplicate id {} in {}", id, table)));
            }
        }
        rows.push(row.clone());

        debug!("Inserted row into {}", table);
        Ok(row)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DatabaseError> {
        let prepared = rows
            .into_iter()
            .map(|row| Self::prepare_row(table, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.to_string()).or_default();
        stored.extend(prepared.iter().cloned());

        debug!("Inserted {} rows into {}", prepared.len(), table);
        Ok(prepared)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();

        sort_rows(&mut rows, query);

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn update(&self, table: &str, id: Uuid, changes: Value) -> Result<Option<Value>, DatabaseError> {
        let changes = changes
            .as_object()
            .cloned()
            .ok_or_else(|| DatabaseError::InvalidRow("Update payload must be a JSON object".to_string()))?;

        let id = id.to_string();
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id.as_str())))
        else {
            return Ok(None);
        };

        if let Some(object) = row.as_object_mut() {
            for (key, value) in changes {
                if key != "id" {
                    object.insert(key, value);
                }
            }
        }

        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<bool, DatabaseError> {
        let id = id.to_string();
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };

        let before = rows.len();
        rows.retain(|row| row_id(row) != Some(id.as_str()));
        Ok(rows.len() != before)
    }
}
