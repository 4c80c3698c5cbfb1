use crate::config::{RecordBackend, RecordsConfig};
use crate::error::{AppError, Result};
use crate::state::{CsvRecordStore, InMemoryRecordStore, RecordStore};
use std::sync::Arc;

/// Create a record store based on configuration
pub fn create_record_store(config: &RecordsConfig) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        RecordBackend::Csv => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("CSV backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing CSV record backend");

            let store = CsvRecordStore::new(path)?;
            Ok(Arc::new(store))
        }

        RecordBackend::Memory => Ok(create_in_memory_record_store()),
    }
}

/// Create an in-memory record store (for testing and development)
pub fn create_in_memory_record_store() -> Arc<dyn RecordStore> {
    tracing::info!("Initializing in-memory record backend");
    Arc::new(InMemoryRecordStore::new())
}
