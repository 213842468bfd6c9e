use std::sync::Arc;

use crate::error::CatalogError;
use crate::storage::KeyValueStore;

const SESSION_ID_KEY_PREFIX: &str = "async-query-session-id_";

/// Engine session ids remembered per data source, so successive discovery
/// queries reuse a warm session.
pub trait SessionStore: Send + Sync {
    fn get_session_id(&self, data_source_name: &str) -> Result<Option<String>, CatalogError>;

    fn set_session_id(&self, data_source_name: &str, session_id: &str) -> Result<(), CatalogError>;
}

/// Session ids kept in the same key/value store as the catalog cache.
pub struct StorageSessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl StorageSessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    fn key(data_source_name: &str) -> String {
        format!("{}{}", SESSION_ID_KEY_PREFIX, data_source_name)
    }
}

impl SessionStore for StorageSessionStore {
    fn get_session_id(&self, data_source_name: &str) -> Result<Option<String>, CatalogError> {
        Ok(self
            .storage
            .get_item(&Self::key(data_source_name))?
            .filter(|id| !id.is_empty()))
    }

    fn set_session_id(&self, data_source_name: &str, session_id: &str) -> Result<(), CatalogError> {
        tracing::debug!("Storing session id for data source {}", data_source_name);
        self.storage
            .set_item(&Self::key(data_source_name), session_id)
    }
}
