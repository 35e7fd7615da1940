//! Shared application state handed to every handler.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    config::Config,
    db::DbPool,
    services::{classifier::ReviewClassifier, explorer::ExplorerSource},
};

/// Cloned into each request by Axum's `State` extractor; every field is a
/// cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub explorer: Arc<dyn ExplorerSource>,
    pub classifier: Arc<dyn ReviewClassifier>,
    /// Held for the duration of a sync run; scheduled and manual runs never overlap
    pub sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        config: Config,
        explorer: Arc<dyn ExplorerSource>,
        classifier: Arc<dyn ReviewClassifier>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            explorer,
            classifier,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// State for tests that never reach the database: the pool connects lazily
/// to a closed port, retries do not sleep and the scheduler is off.
#[cfg(test)]
pub(crate) fn offline_state(explorer: Arc<dyn ExplorerSource>) -> AppState {
    use crate::services::classifier::KeywordClassifier;

    let config: Config = envy::from_iter(vec![
        (
            "DATABASE_URL".to_string(),
            "postgres://postgres@127.0.0.1:1/unused".to_string(),
        ),
        ("EXPLORER_API_KEY".to_string(), "test".to_string()),
        ("RETRY_BASE_DELAY_MS".to_string(), "0".to_string()),
        ("RETRY_MAX_DELAY_MS".to_string(), "0".to_string()),
        ("SYNC_INTERVAL_SECS".to_string(), "0".to_string()),
    ])
    .unwrap();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();

    AppState::new(pool, config, explorer, Arc::new(KeywordClassifier))
}
