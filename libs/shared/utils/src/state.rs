use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::{Database, MemoryDatabase, SupabaseClient};
use tracing::info;

/// Shared handles every cell router is built from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<dyn Database>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: Arc<dyn Database>) -> Self {
        Self { config, db }
    }

    /// PostgREST storage when Supabase is configured, otherwise an in-memory store.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let db: Arc<dyn Database> = if config.is_supabase_configured() {
            info!("Using Supabase storage at {}", config.supabase_url);
            Arc::new(SupabaseClient::new(&config))
        } else {
            info!("Using in-memory storage");
            Arc::new(MemoryDatabase::new())
        };

        Self::new(config, db)
    }
}
