//! Probe ingress endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, instrument};

use crate::actors::messages::Report;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ProbesResponse, ReportPayload},
};

fn machine_name(raw: &str) -> ApiResult<String> {
    let machine = raw.trim();
    if machine.is_empty() {
        return Err(ApiError::InvalidRequest(
            "machine name is required".to_string(),
        ));
    }
    Ok(machine.to_string())
}

/// POST /probe/{machine}/report
///
/// Accepted reports are queued for the registry; processing happens asynchronously.
#[instrument(skip(state, body))]
pub async fn post_report(
    State(state): State<ApiState>,
    Path(machine): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let machine = machine_name(&machine)?;

    if body.is_empty() {
        return Err(ApiError::InvalidRequest("payload is required".to_string()));
    }

    let payload: ReportPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid payload for {machine}: {e}")))?;

    let report = if payload.is_delete() {
        Report::delete(machine)
    } else {
        Report::new(machine, payload.services)
    };

    state.registry.submit(report).await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /probe/{machine}
#[instrument(skip(state))]
pub async fn delete_probe(
    State(state): State<ApiState>,
    Path(machine): Path<String>,
) -> ApiResult<StatusCode> {
    let machine = machine_name(&machine)?;
    debug!("queueing delete for {machine}");

    state.registry.submit(Report::delete(machine)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /probes
pub async fn list_probes(State(state): State<ApiState>) -> ApiResult<Json<ProbesResponse>> {
    let snapshot = state.registry.snapshot().await?;

    Ok(Json(ProbesResponse {
        total: snapshot.probes.len(),
        probes: snapshot.probes,
    }))
}
