use crate::engine::MetricsEngine;
use crate::metrics::Metrics;
use crate::readiness::Readiness;
use crate::snapshot::{Collected, Timestamp};
use crate::thresholds::Subsystem;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};

const SERVICE_NAME: &str = "sysinsight";

#[derive(Clone)]
pub struct HttpAppState {
    pub engine: MetricsEngine,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: Timestamp,
    service: &'static str,
    version: &'static str,
}

pub fn build_router(
    engine: MetricsEngine,
    metrics: Arc<Metrics>,
    cors_origins: &[String],
) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .route("/readyz", get(ready))
        .route("/metrics", get(metrics_handler))
        .route("/api/metrics/cpu", get(cpu_handler))
        .route("/api/metrics/memory", get(memory_handler))
        .route("/api/metrics/disk", get(disk_handler))
        .route("/api/metrics/all", get(all_handler))
        .fallback(not_found)
        .layer(cors_layer(cors_origins))
        .with_state(HttpAppState { engine, metrics })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let list: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(origin = %o, error = %err, "некорректный CORS origin пропущен");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(list))
}

async fn collect_blocking<T, F>(state: &HttpAppState, f: F) -> Result<T, Response>
where
    F: FnOnce(&MetricsEngine) -> T + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|err| {
            error!(error = %err, "задача сбора метрик завершилась аварийно");
            internal_error("Failed to collect metrics")
        })
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(HealthBody {
        status: "healthy",
        timestamp: Timestamp::now(),
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<HttpAppState>) -> Response {
    let readiness = match collect_blocking(&state, |engine| engine.readiness()).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let status_code = if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    state.metrics.inc_readiness(match &readiness {
        Readiness::Ready { .. } => "ready",
        Readiness::NotReady { .. } => "not_ready",
        Readiness::Error { .. } => "error",
    });
    (status_code, Json(readiness)).into_response()
}

async fn cpu_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_request("cpu");
    match collect_blocking(&state, |engine| engine.cpu()).await {
        Ok(cpu) => {
            match &cpu {
                Collected::Snapshot(s) => state.metrics.observe_cpu(s),
                Collected::Failed(_) => state.metrics.inc_collect_error(Subsystem::Cpu),
            }
            Json(cpu).into_response()
        }
        Err(resp) => resp,
    }
}

async fn memory_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_request("memory");
    match collect_blocking(&state, |engine| engine.memory()).await {
        Ok(memory) => {
            match &memory {
                Collected::Snapshot(s) => state.metrics.observe_memory(s),
                Collected::Failed(_) => state.metrics.inc_collect_error(Subsystem::Memory),
            }
            Json(memory).into_response()
        }
        Err(resp) => resp,
    }
}

async fn disk_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_request("disk");
    match collect_blocking(&state, |engine| engine.disk()).await {
        Ok(disk) => {
            match &disk {
                Collected::Snapshot(s) => state.metrics.observe_disk(s),
                Collected::Failed(_) => state.metrics.inc_collect_error(Subsystem::Disk),
            }
            Json(disk).into_response()
        }
        Err(resp) => resp,
    }
}

async fn all_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_request("all");
    match collect_blocking(&state, |engine| engine.all()).await {
        Ok(all) => {
            state.metrics.observe_all(&all);
            Json(all).into_response()
        }
        Err(resp) => resp,
    }
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => {
            error!(error = %err, "ошибка кодирования метрик");
            internal_error("Internal server error")
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::FakeSource;
    use crate::collectors::{CounterSource, RawCpu, RawDisk, RawMemory, RawUsage};
    use crate::engine::EngineSettings;
    use crate::snapshot::CollectionError;
    use std::time::Duration;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct PanickingSource;

    impl CounterSource for PanickingSource {
        fn read_cpu(&self, _window: Duration) -> Result<RawCpu, CollectionError> {
            panic!("драйвер счётчиков упал");
        }

        fn read_memory(&self) -> Result<RawMemory, CollectionError> {
            Err(CollectionError::new("нет данных"))
        }

        fn read_disk(&self) -> Result<RawDisk, CollectionError> {
            Err(CollectionError::new("нет данных"))
        }

        fn read_root_usage(&self) -> Result<RawUsage, CollectionError> {
            Err(CollectionError::new("нет данных"))
        }
    }

    fn app(source: impl CounterSource + 'static, alerts_enabled: bool) -> Router {
        let engine = MetricsEngine::new(
            Arc::new(source),
            EngineSettings {
                alerts_enabled,
                ..EngineSettings::default()
            },
        );
        let metrics = Metrics::new().expect("инициализация метрик");
        build_router(engine, metrics, &["*".to_string()])
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_service() {
        for uri in ["/health", "/healthz"] {
            let (status, body) = get_json(app(FakeSource::healthy(), false), uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["service"], "sysinsight");
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn cpu_endpoint_returns_snapshot() {
        let (status, body) = get_json(app(FakeSource::healthy(), false), "/api/metrics/cpu").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["percent"], 10.0);
        assert_eq!(body["per_core"], json!([5.0, 15.0]));
        assert_eq!(body["cores"]["logical"], 2);
        assert_eq!(body["frequency"]["max"], 3600.0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn memory_and_disk_endpoints() {
        let (status, body) =
            get_json(app(FakeSource::healthy(), false), "/api/metrics/memory").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["virtual"]["percent"], 10.0);
        assert_eq!(body["swap"]["total_gb"], 0.0);

        let (status, body) = get_json(app(FakeSource::healthy(), false), "/api/metrics/disk").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["partitions"][0]["mountpoint"], "/");
        assert!(body["io_stats"].is_null());
    }

    #[tokio::test]
    async fn failed_subsystem_is_reported_with_ok_status() {
        let mut source = FakeSource::healthy();
        source.memory = Err("sysctl недоступен".to_string());
        let (status, body) = get_json(app(source, false), "/api/metrics/memory").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "sysctl недоступен");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn all_omits_alerts_when_disabled() {
        let (status, body) = get_json(app(FakeSource::healthy(), false), "/api/metrics/all").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("alerts").is_none());
        assert!(body.get("cpu").is_some());
        assert!(body.get("memory").is_some());
        assert!(body.get("disk").is_some());
    }

    #[tokio::test]
    async fn all_includes_alerts_for_collected_subsystems() {
        let mut source = FakeSource::healthy().with_cpu_percent(85.0);
        source.disk = Err("EACCES".to_string());
        let (status, body) = get_json(app(source, true), "/api/metrics/all").await;
        assert_eq!(status, StatusCode::OK);
        let alerts = body["alerts"].as_object().expect("alerts должен быть объектом");
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts["cpu"], "critical");
        assert_eq!(alerts["memory"], "normal");
        assert!(!alerts.contains_key("disk"));
    }

    #[tokio::test]
    async fn ready_returns_200_when_healthy() {
        for uri in ["/ready", "/readyz"] {
            let (status, body) = get_json(app(FakeSource::healthy(), false), uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ready");
            assert_eq!(body["checks"], json!({"cpu": true, "memory": true, "disk": true}));
        }
    }

    #[tokio::test]
    async fn ready_returns_503_when_disk_saturated() {
        let source = FakeSource::healthy().with_root_percent(97);
        let (status, body) = get_json(app(source, false), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["disk"], false);
        assert_eq!(body["checks"]["cpu"], true);
        assert_eq!(body["metrics"]["disk_percent"], 97.0);
    }

    #[tokio::test]
    async fn ready_returns_503_on_collection_error() {
        let mut source = FakeSource::healthy();
        source.cpu = Err("нет данных".to_string());
        let (status, body) = get_json(app(source, false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "нет данных");
    }

    #[tokio::test]
    async fn panicking_collection_is_json_500() {
        let (status, body) = get_json(app(PanickingSource, false), "/api/metrics/cpu").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to collect metrics");
    }

    #[tokio::test]
    async fn unknown_api_path_is_json_404() {
        let (status, body) = get_json(app(FakeSource::healthy(), false), "/api/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_request_counters() {
        let router = app(FakeSource::healthy(), true);
        let _ = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/metrics/all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("sysinsight_requests_total{endpoint=\"all\"} 1"));
        assert!(text.contains("sysinsight_alert_level{subsystem=\"memory\"} 0"));
    }
}
