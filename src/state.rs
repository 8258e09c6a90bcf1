use crate::config::AppConfig;
use crate::storage::FileStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileStore>,
    pub config: Arc<AppConfig>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, store: FileStore) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            start_time: chrono::Utc::now(),
        }
    }
}
