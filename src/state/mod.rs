pub mod csv_store;
pub mod factory;
pub mod store;

pub use csv_store::{readings_to_csv, CsvRecordStore, RECORD_HEADER};
pub use factory::{create_in_memory_record_store, create_record_store};
pub use store::InMemoryRecordStore;

use crate::error::Result;
use crate::models::SensorReading;
use async_trait::async_trait;

/// Append-only log of sensor readings
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a reading at the end of the log
    async fn append(&self, reading: SensorReading) -> Result<()>;

    /// Most recently appended reading
    async fn latest(&self) -> Result<Option<SensorReading>>;

    /// Number of stored readings
    async fn count(&self) -> Result<usize>;

    /// Every reading, oldest first
    async fn all(&self) -> Result<Vec<SensorReading>>;
}
