//! HTTP request metrics and the Prometheus exposition endpoint.
//!
//! Counters and histograms go through the `metrics` facade; the
//! process-wide Prometheus recorder renders them for `GET /metrics`.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

use crate::ApiState;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle to the process-wide Prometheus recorder, installed on first use.
///
/// If some other recorder already owns the process, the handle renders an
/// empty exposition.
pub fn prometheus_handle() -> PrometheusHandle {
    RECORDER
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "metrics recorder unavailable, /metrics will be empty");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Count every routed request by status and method, and time it by route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_default();
    let start = Instant::now();

    let resp = next.run(req).await;

    counter!("cfgrid_http_requests_total").increment(1);
    counter!("cfgrid_http_responses_total", "status" => resp.status().as_u16().to_string())
        .increment(1);
    counter!("cfgrid_http_requests_by_method_total", "method" => method.clone()).increment(1);
    histogram!("cfgrid_http_request_duration_seconds", "endpoint" => format!("{method} {endpoint}"))
        .record(start.elapsed().as_secs_f64());
    resp
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgrid_state::*;

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let kv = RedbKv::open_in_memory().unwrap().shared();
        let gate = IdempotencyGate::new(kv.clone());
        let state = ApiState::new(ConfigStore::new(kv.clone(), gate.clone()), ConfigGroupStore::new(kv, gate));

        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[test]
    fn handle_is_shared() {
        let handle = prometheus_handle();
        counter!("cfgrid_test_shared_total").increment(3);
        assert!(handle.render().contains("cfgrid_test_shared_total 3"));
    }
}
