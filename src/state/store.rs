use crate::error::Result;
use crate::models::SensorReading;
use crate::state::RecordStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// In-memory record store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    readings: Arc<RwLock<Vec<SensorReading>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, reading: SensorReading) -> Result<()> {
        tracing::debug!(timestamp = %reading.timestamp, "Reading stored");
        self.readings.write().push(reading);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<SensorReading>> {
        Ok(self.readings.read().last().cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.readings.read().len())
    }

    async fn all(&self) -> Result<Vec<SensorReading>> {
        Ok(self.readings.read().clone())
    }
}
