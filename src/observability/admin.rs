//! # Admin HTTP Surface
//!
//! Minimal `axum` router exposing `/healthz` and `/metrics`, independent of
//! the xDS gRPC port.

use super::health::HealthChecker;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
struct AdminState {
    health: HealthChecker,
    metrics: Arc<PrometheusHandle>,
}

pub fn router(health: HealthChecker, metrics: PrometheusHandle) -> Router {
    let state = AdminState { health, metrics: Arc::new(metrics) };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz(State(state): State<AdminState>) -> impl IntoResponse {
    if state.health.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_reports_service_unavailable_before_ready() {
        let health = HealthChecker::new();
        let metrics = crate::observability::metrics::standalone_handle();
        let app = router(health, metrics);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthz_reports_ok_once_ready() {
        let health = HealthChecker::new();
        health.mark_ready();
        let metrics = crate::observability::metrics::standalone_handle();
        let app = router(health, metrics);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
