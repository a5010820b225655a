mod health;
mod metrics;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/predict", post(predict::predict_image))
        .route("/health", get(health::healthcheck))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
}
