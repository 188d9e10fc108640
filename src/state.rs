use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::AppConfig;

/// Shared application state, cheap to clone into handlers and jobs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    /// collector employee id -> assigned ward ids, short TTL.
    pub ward_cache: Cache<String, Arc<Vec<String>>>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = crate::db::build_pool(&config)?;

        let ward_cache = Cache::builder()
            .max_capacity(config.ward_cache_max_entries)
            .time_to_live(Duration::from_secs(config.ward_cache_ttl_seconds.max(1)))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            ward_cache,
        })
    }
}
