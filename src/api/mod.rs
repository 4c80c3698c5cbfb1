pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::InferenceService;
use crate::state::RecordStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inference: Arc<InferenceService>,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(inference: Arc<InferenceService>, records: Arc<dyn RecordStore>) -> Self {
        Self { inference, records }
    }
}
