use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use massa_loadcell::DeviceStatus;
use serde::{Deserialize, Serialize};

use super::{with_scale, ApiError};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/weight", get(get_weight))
        .route("/tare", post(tare))
        .route("/calibration", get(get_calibration))
        .route("/calibrate", post(calibrate))
}

#[derive(Debug, Serialize)]
pub struct WeightResponse {
    pub weight: f64,
    pub status: &'static str,
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// Weight rounded to the gram fraction shown by clients
pub fn round_weight(weight: f64) -> f64 {
    (weight * 1000.0).round() / 1000.0
}

/// GET /api/weight - Smoothed weight, or the demo value while the load cell is unavailable
async fn get_weight(State(state): State<Arc<AppState>>) -> Result<Json<WeightResponse>, ApiError> {
    let reading = with_scale(&state, |scale| scale.get_weight()).await?;
    Ok(Json(WeightResponse {
        weight: round_weight(reading.value),
        status: "success",
        connected: reading.device_available,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TareRequest {
    pub samples: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TareResponse {
    pub status: &'static str,
    pub new_tare: f64,
    pub connected: bool,
}

/// POST /api/tare - Store the current load as zero
async fn tare(
    State(state): State<Arc<AppState>>,
    request: Option<Json<TareRequest>>,
) -> Result<Json<TareResponse>, ApiError> {
    let samples = request
        .and_then(|Json(request)| request.samples)
        .unwrap_or(state.config.scale.acquisition.tare_samples);

    let new_tare = with_scale(&state, move |scale| scale.tare(samples)).await?;
    tracing::info!(new_tare, samples, "tare requested over HTTP");

    Ok(Json(TareResponse {
        status: "success",
        new_tare,
        connected: true,
    }))
}

#[derive(Debug, Serialize)]
pub struct CalibrationResponse {
    pub tare: f64,
    pub scale_factor: f64,
    pub calibrated: bool,
    pub connected: bool,
}

/// GET /api/calibration - Current zero offset and scale factor
async fn get_calibration(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CalibrationResponse>, ApiError> {
    let (profile, status) = with_scale(&state, |scale| {
        Ok((scale.get_calibration()?, scale.status()?))
    })
    .await?;

    Ok(Json(CalibrationResponse {
        tare: profile.zero_offset,
        scale_factor: profile.scale_factor,
        calibrated: !profile.is_placeholder(),
        connected: status == DeviceStatus::Available,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CalibrateRequest {
    pub known_mass: f64,
    pub samples: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CalibrateResponse {
    pub status: &'static str,
    pub tare: f64,
    pub scale_factor: f64,
    pub connected: bool,
}

/// POST /api/calibrate - Derive the scale factor from a reference mass on the scale
async fn calibrate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CalibrateRequest>,
) -> Result<Json<CalibrateResponse>, ApiError> {
    let samples = request
        .samples
        .unwrap_or(state.config.scale.acquisition.calibration_samples);
    let known_mass = request.known_mass;

    let profile = with_scale(&state, move |scale| scale.calibrate(known_mass, samples)).await?;

    Ok(Json(CalibrateResponse {
        status: "success",
        tare: profile.zero_offset,
        scale_factor: profile.scale_factor,
        connected: true,
    }))
}
