mod weight;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

pub use weight::{run_weight_sampler, weight_ws};

/// Build the WebSocket router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/weight", axum::routing::get(weight_ws))
}
