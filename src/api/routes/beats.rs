//! Historical beat endpoint

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::BeatsResponse,
};
use crate::model::{BeatQuery, ServiceId};

/// Upper bound for `limit`
const MAX_LIMIT: usize = 10_000;

/// Query parameters for a beat time range
#[derive(Debug, Deserialize)]
pub struct BeatsParams {
    /// Start time (RFC 3339), unbounded when absent
    start: Option<DateTime<Utc>>,

    /// End time (RFC 3339), unbounded when absent
    end: Option<DateTime<Utc>>,

    /// Keep only the newest `limit` matches
    limit: Option<usize>,
}

/// GET /api/v1/services/:id/beats
pub async fn get_service_beats(
    State(state): State<ApiState>,
    Path(service_id): Path<ServiceId>,
    Query(params): Query<BeatsParams>,
) -> ApiResult<Json<BeatsResponse>> {
    if let (Some(start), Some(end)) = (params.start, params.end)
        && start > end
    {
        return Err(ApiError::InvalidRequest("start is after end".to_string()));
    }

    if state.monitor.storage().get_service(service_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("service {service_id} does not exist")));
    }

    let query = BeatQuery {
        start: params.start,
        end: params.end,
        limit: Some(params.limit.unwrap_or(MAX_LIMIT).min(MAX_LIMIT)),
    };
    let beats = state.monitor.service_beats(service_id, query).await?;

    Ok(Json(BeatsResponse {
        service_id,
        count: beats.len(),
        beats,
    }))
}
