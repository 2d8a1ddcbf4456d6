use std::sync::Arc;

use crate::services::queue::JobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobStore>,
}

impl AppState {
    pub fn new(queue: Arc<dyn JobStore>) -> Self {
        Self { queue }
    }
}
