//! API response types

use serde::{Deserialize, Serialize};

use crate::model::{Beat, ServiceId};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Response for GET /api/v1/services/:id/beats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatsResponse {
    pub service_id: ServiceId,
    pub count: usize,
    /// Oldest first
    pub beats: Vec<Beat>,
}
