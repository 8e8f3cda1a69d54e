//! REST surface over the lookup service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{MatchedPath, Path, Query, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::LookupError;
use crate::metrics::{LOOKUP_ENDPOINT, Metrics, MetricsSummary, UNMATCHED_ENDPOINT};
use crate::service::{ZipLookup, failure_for};
use crate::types::{BatchEntry, LookupFailure, LookupResult, TableStats};

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const LOOKUP_ROUTE: &str = "/api/lookup/:code";

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<ZipLookup>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(lookup: Arc<ZipLookup>, metrics: Arc<Metrics>) -> Self {
        Self { lookup, metrics }
    }
}

/// Build the Axum application with routes and middleware
pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .route("/api/lookup", get(lookup_query))
        .route(LOOKUP_ROUTE, get(lookup_path))
        .route("/api/batch", post(lookup_batch))
        .route("/api/states", get(list_states))
        // Metrics
        .route("/api/metrics", get(metrics_summary))
        .route("/metrics", get(metrics_exposition))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Records every request into the shared metrics after the response is built.
///
/// Requests are grouped by route template, never by raw path; anything that
/// hits no route shares a single key.
async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = match request.extensions().get::<MatchedPath>() {
        Some(matched) if matched.as_str() == LOOKUP_ROUTE => LOOKUP_ENDPOINT.to_string(),
        Some(matched) => matched.as_str().to_string(),
        None => UNMATCHED_ENDPOINT.to_string(),
    };
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    state
        .metrics
        .record_request(&method, &endpoint, response.status().as_u16(), elapsed_ms);
    response
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    stats: TableStats,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        stats: state.lookup.stats(),
    })
}

/// Look up a code given in the path
async fn lookup_path(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LookupResult>, ApiError> {
    resolve(&state, &code).map(Json)
}

#[derive(Deserialize)]
struct LookupQuery {
    zip: Option<String>,
}

/// Look up a code given as `?zip=`
async fn lookup_query(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<LookupResult>, ApiError> {
    let zip = query
        .zip
        .filter(|z| !z.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing zip parameter".to_string()))?;
    resolve(&state, &zip).map(Json)
}

fn resolve(state: &AppState, raw: &str) -> Result<LookupResult, ApiError> {
    match state.lookup.try_lookup(raw) {
        Ok(result) => {
            state.metrics.record_lookup(&result.zip, Some(&result));
            Ok(result)
        }
        Err(e) => {
            state.metrics.record_lookup(raw, None);
            tracing::debug!("Lookup miss for {:?}: {}", raw, e);
            Err(ApiError::from_lookup(raw, e))
        }
    }
}

#[derive(Serialize)]
struct BatchResponse {
    results: Vec<BatchEntry>,
}

/// Look up many codes at once; body is `{"zips": [...]}`
async fn lookup_batch(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let zips = match body.get("zips") {
        None | Some(Value::Null) => {
            return Err(ApiError::BadRequest("Missing zips array".to_string()));
        }
        Some(Value::Array(zips)) => zips,
        Some(_) => return Err(ApiError::BadRequest("zips must be an array".to_string())),
    };

    let results = state
        .lookup
        .batch(zips)
        .map_err(|e| ApiError::from_lookup("", e))?;

    for entry in &results {
        match entry {
            BatchEntry::Found(result) => state.metrics.record_lookup(&result.zip, Some(result)),
            BatchEntry::Failed(failure) => state.metrics.record_lookup(&failure.zip, None),
        }
    }

    tracing::info!("Batch lookup of {} ZIP codes", results.len());
    Ok(Json(BatchResponse { results }))
}

#[derive(Serialize)]
struct StatesResponse {
    states: Vec<String>,
}

/// Distinct state codes in the loaded table
async fn list_states(State(state): State<AppState>) -> Json<StatesResponse> {
    Json(StatesResponse {
        states: state.lookup.states(),
    })
}

/// Usage summary as JSON
async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

/// Usage counters in the text exposition format
async fn metrics_exposition(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.exposition(),
    )
        .into_response()
}

/// JSON 404 for paths that match no route
async fn not_found() -> Response {
    let body = Json(serde_json::json!({ "error": "Not found" }));
    (StatusCode::NOT_FOUND, body).into_response()
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(LookupFailure),
    Unavailable(String),
}

impl ApiError {
    fn from_lookup(raw: &str, error: LookupError) -> Self {
        match error {
            LookupError::NotFound { .. } | LookupError::Validation(_) => {
                Self::NotFound(failure_for(raw, &error))
            }
            LookupError::Capacity { .. } => Self::BadRequest(error.to_string()),
            LookupError::NotReady | LookupError::DataLoad(_) => Self::Unavailable(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(failure) => (StatusCode::NOT_FOUND, Json(failure)).into_response(),
            ApiError::BadRequest(msg) => {
                let body = Json(serde_json::json!({ "error": msg }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Unavailable(msg) => {
                let body = Json(serde_json::json!({ "error": msg }));
                (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::LookupTable;
    use axum::body::{Body, to_bytes};
    use axum::http::{self, Method};
    use serde_json::json;
    use tower::ServiceExt;

    const ARTIFACT: &str = r#"{
        "12345": [
            {"city": "Schenectady", "state": "NY", "county": "Schenectady"},
            {"city": "Rotterdam", "state": "NY", "county": "Schenectady"}
        ],
        "90210": {"city": "Beverly Hills", "state": "CA", "county": "Los Angeles"},
        "10001": {"city": "New York", "state": "NY", "county": "New York"}
    }"#;

    fn state() -> AppState {
        let table = LookupTable::from_json(ARTIFACT).unwrap();
        AppState::new(
            Arc::new(ZipLookup::with_table(table)),
            Arc::new(Metrics::new()),
        )
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_app(state());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "zipCodes": 3, "states": 2}));
    }

    #[tokio::test]
    async fn test_lookup_by_path() {
        let app = build_app(state());
        let (status, body) = send(&app, Method::GET, "/api/lookup/12345", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["zip"], "12345");
        assert_eq!(body["hasMultiple"], true);
        assert_eq!(body["locations"][1]["city"], "Rotterdam");

        let (status, body) = send(&app, Method::GET, "/api/lookup/99999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "ZIP code not found", "zip": "99999"}));

        let (status, body) = send(&app, Method::GET, "/api/lookup/abc12", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["zip"], "abc12");
    }

    #[tokio::test]
    async fn test_lookup_by_query() {
        let app = build_app(state());
        let (status, body) = send(&app, Method::GET, "/api/lookup?zip=90210", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasMultiple"], false);
        assert_eq!(body["locations"][0]["county"], "Los Angeles");

        let (status, _) = send(&app, Method::GET, "/api/lookup", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::GET, "/api/lookup?zip=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Blank but present pads to 00000, same as the path form
        let (status, body) = send(&app, Method::GET, "/api/lookup?zip=%20", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "ZIP code not found", "zip": "00000"}));
        let (status, _) = send(&app, Method::GET, "/api/lookup/%20", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_batch() {
        let app = build_app(state());
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/batch",
            Some(json!({"zips": ["90210", "00000", 10001]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["zip"], "90210");
        assert_eq!(results[1], json!({"error": "ZIP code not found", "zip": "00000"}));
        assert_eq!(results[2]["locations"][0]["city"], "New York");
    }

    #[tokio::test]
    async fn test_batch_validation() {
        let app = build_app(state());
        let (status, _) = send(&app, Method::POST, "/api/batch", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/api/batch", Some(json!({"zips": "90210"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let too_many: Vec<String> = (0..101).map(|_| "90210".to_string()).collect();
        let (status, body) =
            send(&app, Method::POST, "/api/batch", Some(json!({"zips": too_many}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("100"));
    }

    #[tokio::test]
    async fn test_batch_rejects_unreadable_bodies() {
        let app = build_app(state());

        let cases = [
            http::Request::builder()
                .method(Method::POST)
                .uri("/api/batch")
                .body(Body::empty())
                .unwrap(),
            http::Request::builder()
                .method(Method::POST)
                .uri("/api/batch")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{zips: [90210"))
                .unwrap(),
        ];

        for request in cases {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(
                response.headers()[header::CONTENT_TYPE]
                    .to_str()
                    .unwrap()
                    .starts_with("application/json")
            );
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_states() {
        let app = build_app(state());
        let (status, body) = send(&app, Method::GET, "/api/states", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"states": ["CA", "NY"]}));
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let state = state();
        let app = build_app(state.clone());
        send(&app, Method::GET, "/api/lookup/90210", None).await;
        send(&app, Method::GET, "/api/lookup/10001", None).await;
        send(&app, Method::GET, "/api/lookup/99999", None).await;

        let summary = state.metrics.summary();
        assert_eq!(summary.requests.total, 3);
        assert_eq!(summary.requests.by_endpoint["/api/lookup/:zip"], 3);
        assert_eq!(summary.requests.by_status[&404], 1);
        assert_eq!(summary.lookups.found, 2);
        assert_eq!(summary.lookups.not_found, 1);

        let (status, body) = send(&app, Method::GET, "/api/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lookups"]["total"], 3);
        assert_eq!(body["lookups"]["foundRate"], 67);
    }

    #[tokio::test]
    async fn test_endpoint_keys_stay_bounded() {
        let state = state();
        let app = build_app(state.clone());
        for i in 0..50 {
            send(&app, Method::GET, &format!("/api/lookup/x{i}"), None).await;
            send(&app, Method::GET, &format!("/scan/{i}/wp-login.php"), None).await;
        }
        let (status, body) = send(&app, Method::GET, "/favicon.ico", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found"}));

        let summary = state.metrics.summary();
        assert_eq!(summary.requests.total, 101);
        assert_eq!(summary.requests.by_endpoint.len(), 2);
        assert_eq!(summary.requests.by_endpoint[LOOKUP_ENDPOINT], 50);
        assert_eq!(summary.requests.by_endpoint[UNMATCHED_ENDPOINT], 51);
        assert_eq!(summary.endpoints.len(), 2);
    }

    #[tokio::test]
    async fn test_exposition_endpoint() {
        let app = build_app(state());
        send(&app, Method::GET, "/health", None).await;

        let response = app
            .clone()
            .oneshot(http::Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            EXPOSITION_CONTENT_TYPE
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("zipfill_requests_by_endpoint_total{endpoint=\"/health\"} 1"));
    }

    #[tokio::test]
    async fn test_unloaded_service_is_unavailable() {
        let app = build_app(AppState::new(
            Arc::new(ZipLookup::new()),
            Arc::new(Metrics::new()),
        ));
        let (status, _) = send(&app, Method::GET, "/api/lookup/90210", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
