use crate::models::sample::{
    FeatureInput, FLOW_M_S, PH, TEMPERATURE_C, TRASH_DETECTED, TURBIDITY_NTU,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the record log
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observation pushed by the field device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Server-side receive time
    pub timestamp: NaiveDateTime,

    /// pH value
    pub ph_value: f64,

    /// Turbidity (NTU)
    pub turbidity: f64,

    /// Water temperature (C)
    pub temperature: f64,

    /// Flow speed (m/s)
    pub flow_value: f64,
}

impl SensorReading {
    /// Create a reading stamped with the current local time
    pub fn new(ph_value: f64, turbidity: f64, temperature: f64, flow_value: f64) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            ph_value,
            turbidity,
            temperature,
            flow_value,
        }
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Map the log columns onto classifier feature names.
    ///
    /// The log does not carry a trash flag, so it is always 0.
    pub fn to_features(&self) -> FeatureInput {
        FeatureInput::new()
            .with(TEMPERATURE_C, self.temperature)
            .with(PH, self.ph_value)
            .with(TURBIDITY_NTU, self.turbidity)
            .with(FLOW_M_S, self.flow_value)
            .with(TRASH_DETECTED, 0.0)
    }
}
