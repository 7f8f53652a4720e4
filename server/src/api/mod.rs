mod device;
mod error;
mod weight;

use std::sync::Arc;

use axum::Router;
use massa_loadcell::WeighingSystem;

use crate::AppState;

pub use error::ApiError;
pub use weight::round_weight;

/// Build the API router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(weight::router())
        .nest("/device", device::router())
}

/// Run `op` against the scale on a blocking worker. Conversions sleep between
/// polls and must stay off the async executor.
pub async fn with_scale<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn WeighingSystem) -> massa_loadcell::Result<T> + Send + 'static,
{
    let scale = Arc::clone(&state.scale);
    let result = tokio::task::spawn_blocking(move || op(scale.as_ref())).await?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use massa_loadcell::{sampler::ReadyWait, Scale, SimulatedHx711};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    fn state(sim: &SimulatedHx711) -> Arc<AppState> {
        let mut config = Config::default();
        config.scale.ready = ReadyWait {
            poll_interval: Duration::ZERO,
            max_polls: 3,
        };
        config.scale.acquisition.sample_delay = Duration::ZERO;
        config.scale.acquisition.weight_samples = 3;
        config.scale.acquisition.tare_samples = 3;
        config.scale.acquisition.calibration_samples = 3;

        let scale = Arc::new(Scale::new(sim.clone(), &config.scale));
        Arc::new(AppState::new(scale, config))
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = crate::app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_weight_after_implicit_tare_is_zero() {
        let sim = SimulatedHx711::new(91_096);
        let (status, body) = send(state(&sim), get("/api/weight")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["weight"], json!(0.0));
        assert_eq!(body["status"], "success");
        assert_eq!(body["connected"], true);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_weight_without_hardware_degrades() {
        let sim = SimulatedHx711::new(0);
        sim.set_fail_claims(true);
        let (status, body) = send(state(&sim), get("/api/weight")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
    }

    #[tokio::test]
    async fn test_tare_and_calibrate_round_trip() {
        let sim = SimulatedHx711::new(2_000);
        let state = state(&sim);

        let (status, body) = send(state.clone(), post("/api/tare", json!({ "samples": 5 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["new_tare"], json!(2000.0));

        sim.set_idle_raw(54_000);
        let (status, body) = send(state.clone(), post("/api/calibrate", json!({ "known_mass": 500.0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scale_factor"], json!(104.0));

        let (status, body) = send(state, get("/api/calibration")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tare"], json!(2000.0));
        assert_eq!(body["calibrated"], true);
    }

    #[tokio::test]
    async fn test_tare_without_body_uses_default_samples() {
        let sim = SimulatedHx711::new(1_500);
        let request = Request::post("/api/tare").body(Body::empty()).unwrap();
        let (status, body) = send(state(&sim), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["new_tare"], json!(1500.0));
    }

    #[tokio::test]
    async fn test_invalid_mass_is_bad_request() {
        let sim = SimulatedHx711::new(2_000);
        let (status, body) = send(state(&sim), post("/api/calibrate", json!({ "known_mass": 0.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_calibration_input");
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_tare_while_unavailable_is_service_unavailable() {
        let sim = SimulatedHx711::new(0);
        sim.set_fail_claims(true);
        let (status, body) = send(state(&sim), post("/api/tare", json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "device_unavailable");
        assert_eq!(body["connected"], false);
    }

    #[tokio::test]
    async fn test_oversized_tare_is_rejected_and_scale_keeps_serving() {
        let sim = SimulatedHx711::new(2_000);
        let state = state(&sim);

        let (status, body) =
            send(state.clone(), post("/api/tare", json!({ "samples": u64::MAX }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_sample_count");
        assert!(body["connected"].is_null());

        let (status, _) = send(
            state.clone(),
            post("/api/calibrate", json!({ "known_mass": 500.0, "samples": 1_000_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(state.clone(), get("/api/weight")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);

        let (_, body) = send(state, get("/api/device/status")).await;
        assert_eq!(body["status"], "available");
    }

    #[tokio::test]
    async fn test_caller_error_while_unavailable_omits_connected() {
        let sim = SimulatedHx711::new(0);
        sim.set_fail_claims(true);
        let (status, body) =
            send(state(&sim), post("/api/calibrate", json!({ "known_mass": -1.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_calibration_input");
        assert!(body.get("connected").is_none());
    }

    #[tokio::test]
    async fn test_device_status_and_reinit() {
        let sim = SimulatedHx711::new(0);
        sim.set_fail_claims(true);
        let state = state(&sim);

        let (_, body) = send(state.clone(), get("/api/device/status")).await;
        assert_eq!(body["status"], "unavailable");
        assert_eq!(body["connected"], false);
        assert!(body["last_error"].is_string());

        let (status, _) = send(state.clone(), post("/api/device/reinit", json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        sim.set_fail_claims(false);
        let (status, body) = send(state, post("/api/device/reinit", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
        assert_eq!(body["connected"], true);
    }

    #[tokio::test]
    async fn test_unsupported_gain_is_rejected() {
        let sim = SimulatedHx711::new(0);
        let state = state(&sim);
        let (status, body) = send(state.clone(), post("/api/device/gain", json!({ "gain": 16 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "unsupported_gain");

        let (status, body) = send(state, post("/api/device/gain", json!({ "gain": 64 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gain"], 64);
    }
}
