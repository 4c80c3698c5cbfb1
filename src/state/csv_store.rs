use crate::error::{AppError, Result};
use crate::models::{SensorReading, TIMESTAMP_FORMAT};
use crate::state::RecordStore;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Column header of the reading log
pub const RECORD_HEADER: [&str; 5] = ["Timestamp", "Ph_Value", "Turbidity", "Temperature", "Flow_Value"];

/// On-disk layout of one log line
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Ph_Value")]
    ph_value: f64,
    #[serde(rename = "Turbidity")]
    turbidity: f64,
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "Flow_Value")]
    flow_value: f64,
}

impl From<&SensorReading> for CsvRow {
    fn from(reading: &SensorReading) -> Self {
        Self {
            timestamp: reading.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            ph_value: reading.ph_value,
            turbidity: reading.turbidity,
            temperature: reading.temperature,
            flow_value: reading.flow_value,
        }
    }
}

impl TryFrom<CsvRow> for SensorReading {
    type Error = AppError;

    fn try_from(row: CsvRow) -> Result<Self> {
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| AppError::InvalidData(format!("bad timestamp '{}': {}", row.timestamp, e)))?;
        Ok(SensorReading {
            timestamp,
            ph_value: row.ph_value,
            turbidity: row.turbidity,
            temperature: row.temperature,
            flow_value: row.flow_value,
        })
    }
}

/// Reading log kept as a CSV file.
///
/// Timestamps are stored with second precision.
#[derive(Clone)]
pub struct CsvRecordStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CsvRecordStore {
    /// Open the log at `path`, creating it with a header when absent
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        };
        {
            let _guard = store.write_lock.lock();
            store.ensure_header()?;
        }

        tracing::info!(path = %store.path.display(), "Initialized CSV record store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Caller must hold the write lock
    fn ensure_header(&self) -> Result<()> {
        let empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if empty {
            let mut writer = csv::Writer::from_path(&self.path)?;
            writer.write_record(RECORD_HEADER)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn reader(&self) -> Result<Option<csv::Reader<fs::File>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        Ok(Some(reader))
    }

    fn read_all(&self) -> Result<Vec<SensorReading>> {
        let _guard = self.write_lock.lock();
        let Some(mut reader) = self.reader()? else {
            return Ok(Vec::new());
        };

        reader
            .deserialize::<CsvRow>()
            .map(|row| SensorReading::try_from(row?))
            .collect()
    }

    /// Last row that parses; malformed rows are logged and skipped
    fn read_latest(&self) -> Result<Option<SensorReading>> {
        let _guard = self.write_lock.lock();
        let Some(mut reader) = self.reader()? else {
            return Ok(None);
        };

        let mut latest = None;
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            match row.map_err(AppError::from).and_then(SensorReading::try_from) {
                Ok(reading) => latest = Some(reading),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    row = index + 1,
                    error = %e,
                    "Skipping malformed reading"
                ),
            }
        }
        Ok(latest)
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn append(&self, reading: SensorReading) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_header()?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(CsvRow::from(&reading))?;
        writer.flush()?;

        tracing::debug!(timestamp = %reading.timestamp, "Reading appended");
        Ok(())
    }

    async fn latest(&self) -> Result<Option<SensorReading>> {
        self.read_latest()
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    async fn all(&self) -> Result<Vec<SensorReading>> {
        self.read_all()
    }
}

/// Render readings in the log layout, header included
pub fn readings_to_csv(readings: &[SensorReading]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(RECORD_HEADER)?;
    for reading in readings {
        writer.serialize(CsvRow::from(reading))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish CSV export: {}", e)))
}
