//! Water quality monitoring: sensor reading log plus a multi-output
//! classifier that turns one reading into six categorical assessments.

pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod models;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
