pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod queues;

use axum::{Router, routing::get};

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/queues/{project_id}/depth", get(queues::depth))
        .with_state(state)
}
