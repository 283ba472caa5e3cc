//! API shared state

use std::sync::Arc;

use crate::monitor::Monitor;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<Monitor>,
}

impl ApiState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}
