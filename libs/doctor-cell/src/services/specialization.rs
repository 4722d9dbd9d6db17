use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::store::{fetch_all, fetch_by_id, fetch_one, insert_as, update_as};
use shared_database::{Database, Query};
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{Specialization, SpecializationRequest, SPECIALIZATIONS_TABLE};

pub struct SpecializationService {
    db: Arc<dyn Database>,
}

impl SpecializationService {
    pub fn new(state: &AppState) -> Self {
        Self { db: state.db.clone() }
    }

    pub async fn list(&self) -> Result<Vec<Specialization>, AppError> {
        let query = Query::new().order_by("name", false);
        Ok(fetch_all(self.db.as_ref(), SPECIALIZATIONS_TABLE, &query).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Specialization, AppError> {
        fetch_by_id(self.db.as_ref(), SPECIALIZATIONS_TABLE, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Specialization not found".to_string()))
    }

    pub async fn create(&self, request: SpecializationRequest) -> Result<Specialization, AppError> {
        let name = request.name.trim();
        debug!("Creating specialization: {}", name);

        if name.is_empty() {
            return Err(AppError::ValidationError("Specialization name is required".to_string()));
        }
        self.ensure_name_free(name, None).await?;

        let row = json!({
            "id": Uuid::new_v4(),
            "name": name,
            "description": request.description,
            "created_at": Utc::now(),
        });

        let specialization: Specialization = insert_as(self.db.as_ref(), SPECIALIZATIONS_TABLE, row).await?;
        info!("Created specialization {}", specialization.id);
        Ok(specialization)
    }

    pub async fn update(&self, id: Uuid, request: SpecializationRequest) -> Result<Specialization, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Specialization name is required".to_string()));
        }
        self.ensure_name_free(name, Some(id)).await?;

        let changes = json!({ "name": name, "description": request.description });
        update_as(self.db.as_ref(), SPECIALIZATIONS_TABLE, id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound("Specialization not found".to_string()))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.db.delete(SPECIALIZATIONS_TABLE, id).await? {
            return Err(AppError::NotFound("Specialization not found".to_string()));
        }
        info!("Deleted specialization {}", id);
        Ok(())
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), AppError> {
        let mut query = Query::new().eq("name", name);
        if let Some(id) = except {
            query = query.neq("id", id.to_string());
        }

        let existing: Option<Specialization> = fetch_one(self.db.as_ref(), SPECIALIZATIONS_TABLE, &query).await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("Specialization '{}' already exists", name)));
        }
        Ok(())
    }
}
