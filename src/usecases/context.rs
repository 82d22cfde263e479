use crate::infra::{
    config::AppConfig, session_store::SessionStore, storage_layout::StorageLayout,
};

#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub layout: StorageLayout,
    pub tokens: SessionStore,
}

impl AppContext {
    pub fn new(config: AppConfig, layout: StorageLayout, tokens: SessionStore) -> Self {
        Self {
            config,
            layout,
            tokens,
        }
    }
}
