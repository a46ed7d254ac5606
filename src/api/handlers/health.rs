use axum::{extract::State, http::StatusCode};
use tracing::debug;

use crate::api::types::ApiState;

/// Liveness probe
///
/// `GET /healthz` always answers 200 while the process is serving.
pub async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness probe
///
/// `GET /readyz` answers 503 until the first listing of requests has been
/// queued, then 200.
pub async fn readyz(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    if state.informer.has_synced() {
        (StatusCode::OK, "ok")
    } else {
        debug!("Readiness requested before initial sync");
        (StatusCode::SERVICE_UNAVAILABLE, "informer not synced")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::controller::PollingInformer;
    use crate::store::MemoryRequestStore;
    use crate::telemetry::ApproverMetrics;
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> ApiState {
        let informer = PollingInformer::new(
            Arc::new(MemoryRequestStore::new()),
            Arc::new(|_: &str| {}),
            Duration::from_secs(1),
            Duration::ZERO,
        );
        ApiState {
            metrics: Arc::new(ApproverMetrics::new().unwrap()),
            informer: Arc::new(informer),
        }
    }

    async fn get(state: ApiState, uri: &str) -> (StatusCode, String) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, body) = get(state(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readyz_follows_sync() {
        let state = state();

        let (status, _) = get(state.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.informer.sync_once().await.unwrap();

        let (status, body) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
