use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use massa_loadcell::{DeviceStatus, Gain};
use serde::{Deserialize, Serialize};

use super::{with_scale, ApiError};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(device_status))
        .route("/reinit", post(reinit))
        .route("/gain", post(set_gain))
}

#[derive(Debug, Serialize)]
pub struct DeviceStatusResponse {
    status: DeviceStatus,
    connected: bool,
    last_error: Option<String>,
}

/// GET /api/device/status - Load cell health
async fn device_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeviceStatusResponse>, ApiError> {
    let (status, last_error) =
        with_scale(&state, |scale| Ok((scale.status()?, scale.last_error()?))).await?;

    Ok(Json(DeviceStatusResponse {
        status,
        connected: status == DeviceStatus::Available,
        last_error: last_error.map(|err| err.to_string()),
    }))
}

/// POST /api/device/reinit - Release and reclaim the GPIO lines
async fn reinit(State(state): State<Arc<AppState>>) -> Result<Json<DeviceStatusResponse>, ApiError> {
    let status = with_scale(&state, |scale| scale.reinitialize()).await?;
    tracing::info!(?status, "load cell re-initialized over HTTP");

    Ok(Json(DeviceStatusResponse {
        status,
        connected: status == DeviceStatus::Available,
        last_error: None,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GainRequest {
    gain: u32,
}

#[derive(Debug, Serialize)]
pub struct GainResponse {
    gain: u32,
}

/// POST /api/device/gain - Select 128, 64 or 32 for conversions after the next read
async fn set_gain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GainRequest>,
) -> Result<Json<GainResponse>, ApiError> {
    let gain = Gain::try_from(request.gain)?;
    with_scale(&state, move |scale| scale.set_gain(gain)).await?;

    Ok(Json(GainResponse {
        gain: gain.factor(),
    }))
}
