use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app_state::AppState;

/// Prometheus scrape endpoint. Samples the queue depth before rendering so the
/// gauge is fresh on every scrape.
pub async fn prometheus_metrics(
    State((handle, state)): State<(Arc<PrometheusHandle>, AppState)>,
) -> impl IntoResponse {
    match state.queue.queue_depth().await {
        Ok(depth) => metrics::gauge!("variant_queue_depth").set(depth as f64),
        Err(e) => tracing::warn!(error = %e, "Could not sample queue depth"),
    }
    handle.render()
}
