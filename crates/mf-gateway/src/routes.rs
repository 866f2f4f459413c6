//! Route configuration for the metrics API.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, Router};
use mf_ingest::SearchBackend;
use tower_http::trace::TraceLayer;

use crate::config::API_PREFIX;
use crate::handlers::{health_check, ingest_bulk, ingest_with_task, ingest_without_task};
use crate::state::GatewayState;

/// Create the gateway router.
pub fn create_router<B: SearchBackend>(state: Arc<GatewayState<B>>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config().max_body_bytes);

    let mf_routes = Router::new()
        .route("/health", get(health_check::<B>))
        .route("/metrics", post(ingest_bulk::<B>))
        .route(
            "/metrics/{workflow}/{task}/{experiment}",
            post(ingest_with_task::<B>),
        )
        .route(
            "/metrics/{workflow}/{experiment}",
            post(ingest_without_task::<B>),
        );

    Router::new()
        .route("/health", get(health_check::<B>))
        .nest(&format!("{API_PREFIX}/mf"), mf_routes)
        .with_state(state)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mf_ingest::MemoryBackend;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::{BackendConfig, GatewayConfig};

    const BASE: &str = "http://mf.example.org:3040/v1";

    fn make_test_state() -> (Arc<GatewayState<MemoryBackend>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let config = GatewayConfig::default()
            .with_public_base_url(BASE)
            .with_backend(BackendConfig::Memory);
        (Arc::new(GatewayState::new(config, backend.clone())), backend)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = make_test_state();
        let app = create_router(state);

        for uri in ["/health", "/v1/mf/health"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = read_json(response).await;
            assert_eq!(json["status"], "ok");
            assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        }
    }

    #[tokio::test]
    async fn test_single_write_with_task() {
        let (state, backend) = make_test_state();
        let app = create_router(state);

        let response = app
            .oneshot(post_json(
                "/v1/mf/metrics/HPCFapix/Vector_Scal01/AVNXMXcvGMPeuCn4bMe0",
                &json!({"@timestamp": "2016-02-15T12:42:22.000", "GPU0:power": "152.427"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        let (id, entry) = json.as_object().unwrap().iter().next().unwrap();
        assert_eq!(
            entry["href"],
            format!("{BASE}/mf/profiles/hpcfapix/vector_scal01/AVNXMXcvGMPeuCn4bMe0")
        );
        assert_eq!(backend.records("hpcfapix_vector_scal01")[0].id.as_str(), id);
    }

    #[tokio::test]
    async fn test_single_write_task_query() {
        let (state, backend) = make_test_state();
        let app = create_router(state);

        let response = app
            .oneshot(post_json("/v1/mf/metrics/ms2/e1?task=t1", &json!({"cpu": 0.5})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        let entry = json.as_object().unwrap().values().next().unwrap();
        assert_eq!(entry["href"], format!("{BASE}/mf/profiles/ms2/t1/e1"));
        assert_eq!(backend.records("ms2_t1").len(), 1);
    }

    #[tokio::test]
    async fn test_single_write_rejects_array_body() {
        let (state, backend) = make_test_state();
        let app = create_router(state);

        let response = app
            .oneshot(post_json("/v1/mf/metrics/ms2/e1", &json!([1, 2])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.record_count(), 0);
    }

    #[tokio::test]
    async fn test_bulk_rejects_object_body() {
        let (state, _) = make_test_state();
        let app = create_router(state);

        let response = app
            .oneshot(post_json("/v1/mf/metrics", &json!({"WorkflowID": "ms2"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (state, _) = make_test_state();
        let app = create_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/mf/metrics")
            .body(Body::from("[{"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_backend_down_is_service_unavailable() {
        let (state, backend) = make_test_state();
        backend.set_unavailable(true);
        let app = create_router(state);

        let response = app
            .oneshot(post_json("/v1/mf/metrics/ms2/e1", &json!({"cpu": 0.5})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json(response).await["step"], "write");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let backend = Arc::new(MemoryBackend::new());
        let config = GatewayConfig::default()
            .with_public_base_url(BASE)
            .with_max_body_bytes(16);
        let app = create_router(Arc::new(GatewayState::new(config, backend)));

        let response = app
            .oneshot(post_json(
                "/v1/mf/metrics/ms2/e1",
                &json!({"a_rather_long_field_name": "and a long value"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let (state, _) = make_test_state();
        let app = create_router(state);

        let request = Request::builder()
            .uri("/v1/mf/profiles")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_on_metrics_not_allowed() {
        let (state, _) = make_test_state();
        let app = create_router(state);

        let request = Request::builder()
            .uri("/v1/mf/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
