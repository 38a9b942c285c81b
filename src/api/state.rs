use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::SeasonEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SeasonEngine>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(engine: Arc<SeasonEngine>, config: AppConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}
