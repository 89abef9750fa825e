pub mod analysis;
pub mod charts;
pub mod config;
mod embedded_frontend;
mod portfolio_routes;
pub mod request_id;
mod security_headers;
mod symbol_routes;

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use polygon_client::PolygonClient;
use portfolio_core::PortfolioError;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use config::ServerConfig;

pub const API_KEY_HEADER: &str = "x-polygon-api-key";

const MISSING_KEY_MESSAGE: &str = "Please enter your Polygon.io API key to proceed.";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub polygon: PolygonClient,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let polygon = PolygonClient::new(config.polygon_api_key.clone().unwrap_or_default())
            .with_base_url(config.polygon_base_url.clone())
            .with_rate_limit(config.polygon_rate_limit);

        Self {
            config: Arc::new(config),
            polygon,
        }
    }

    /// Client for this request: the browser's key if it sent one, else the server's.
    pub fn polygon_for(&self, headers: &HeaderMap) -> Result<PolygonClient, AppError> {
        let header_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());

        match header_key {
            Some(key) => Ok(self.polygon.with_api_key(key)),
            None if self.polygon.has_api_key() => Ok(self.polygon.clone()),
            None => Err(AppError::with_status(
                StatusCode::UNAUTHORIZED,
                anyhow::anyhow!(MISSING_KEY_MESSAGE),
            )),
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = match error.downcast_ref::<PortfolioError>() {
            Some(e) if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            Some(PortfolioError::MissingResults { .. } | PortfolioError::ApiError(_)) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.error);
        }

        (
            self.status,
            Json(ApiResponse::<()>::error(self.error.to_string())),
        )
            .into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Portfolio Dashboard API",
        description = "Weighted stock portfolio analysis over Polygon.io daily bars"
    ),
    paths(
        health,
        symbol_routes::search_symbols,
        symbol_routes::popular_symbols,
        symbol_routes::validate_symbol,
        portfolio_routes::validate_portfolio,
        portfolio_routes::analyze_portfolio,
    ),
    components(schemas(
        symbol_routes::SymbolSearchResult,
        symbol_routes::SymbolValidation,
        portfolio_routes::PortfolioForm,
        portfolio_routes::AnalyzeRequest,
        portfolio_routes::FormCheck,
        analysis::AnalysisReport,
        analysis::StatsRow,
        analysis::FetchFailure,
        portfolio_core::Holding,
        portfolio_core::SymbolStats,
        portfolio_core::CompositeSeries,
        portfolio_core::Point,
        portfolio_core::Metric,
    )),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Symbols", description = "Ticker search and validation"),
        (name = "Portfolio", description = "Form checks and portfolio analysis")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up")),
    tag = "Health"
)]
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dashboard-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]),
    )
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let router = Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(embedded_frontend::frontend_routes())
        .merge(symbol_routes::symbol_routes())
        .merge(portfolio_routes::portfolio_routes())
        .with_state(state)
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "dashboard_server=info,polygon_client=info,tower_http=info".into()
    });

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    if config.polygon_api_key.is_none() {
        tracing::info!("POLYGON_API_KEY not set; the browser must supply a key");
    }

    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Portfolio dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use axum::{
        body::Body,
        extract::{Path, Query},
        http::Request,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Query strings the stub's ticker search received, in order
    type SearchLog = Arc<Mutex<Vec<HashMap<String, String>>>>;

    fn app_with(config: ServerConfig) -> Router {
        build_router(AppState::new(config))
    }

    fn app() -> Router {
        app_with(ServerConfig::default())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_index_served() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_openapi_lists_routes() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let doc = body_json(response).await;
        assert!(doc["paths"]["/api/portfolio/analyze"].is_object());
        assert!(doc["paths"]["/api/symbols/{symbol}/validate"].is_object());
    }

    #[tokio::test]
    async fn test_popular_symbols() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/symbols/popular")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0], "AAPL");
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_analyze_without_key_is_unauthorized() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/analyze",
                json!({ "holdings": [{ "symbol": "AAPL", "weight": 100.0 }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], MISSING_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn test_analyze_unbalanced_is_rejected() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/analyze",
                json!({ "holdings": [
                    { "symbol": "AAPL", "weight": 60.0 },
                    { "symbol": "MSFT", "weight": 30.0 }
                ] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Total weight: 90% (should be 100%)");
    }

    #[tokio::test]
    async fn test_analyze_reversed_dates_rejected() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/analyze",
                json!({
                    "holdings": [{ "symbol": "AAPL", "weight": 100.0 }],
                    "start_date": "2024-03-01",
                    "end_date": "2024-02-01"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_analyze_default_start_before_calendar_rejected() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/analyze",
                json!({
                    "holdings": [{ "symbol": "AAPL", "weight": 100.0 }],
                    "end_date": "-262143-01-01"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_validate_form() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/validate",
                json!({ "holdings": [
                    { "symbol": " aapl ", "weight": 40.0 },
                    { "symbol": "", "weight": 10.0 },
                    { "symbol": "MSFT", "weight": 0.0 }
                ] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = &body_json(response).await["data"];
        assert_eq!(data["holdings"][0]["symbol"], "AAPL");
        assert_eq!(data["holdings"].as_array().unwrap().len(), 1);
        assert_eq!(data["can_analyze"], false);
        assert_eq!(data["warning"], "Total weight: 40% (should be 100%)");
    }

    #[tokio::test]
    async fn test_validate_empty_form_prompts() {
        let response = app()
            .oneshot(post_json("/api/portfolio/validate", json!({ "holdings": [] })))
            .await
            .unwrap();
        let data = &body_json(response).await["data"];
        assert_eq!(data["info"], "Please add at least one stock to your portfolio.");
        assert_eq!(data["can_analyze"], false);
    }

    #[tokio::test]
    async fn test_validate_duplicate_symbol() {
        let response = app()
            .oneshot(post_json(
                "/api/portfolio/validate",
                json!({ "holdings": [
                    { "symbol": "AAPL", "weight": 50.0 },
                    { "symbol": "aapl", "weight": 50.0 }
                ] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origin() {
        let config = ServerConfig {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            ..ServerConfig::default()
        };
        let response = app_with(config)
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/portfolio/analyze")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let e: AppError = PortfolioError::NoHoldings.into();
        assert_eq!(e.status, StatusCode::UNPROCESSABLE_ENTITY);
        let e: AppError = PortfolioError::ApiError("boom".into()).into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        let e: AppError = PortfolioError::EmptySeries("X".into()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        let e: AppError = anyhow::anyhow!("plain").into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// Serves canned Polygon responses; expects `apiKey=test-key`.
    async fn spawn_stub_polygon() -> (String, SearchLog) {
        async fn aggs(
            Path((symbol, _, _, _, _)): Path<(String, String, String, String, String)>,
            Query(q): Query<HashMap<String, String>>,
        ) -> (StatusCode, Json<Value>) {
            if q.get("apiKey").map(String::as_str) != Some("test-key") {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "status": "ERROR", "error": "Unknown API Key" })),
                );
            }
            let closes = match symbol.as_str() {
                "AAA" => [10.0, 20.0],
                "BBB" => [5.0, 5.0],
                _ => {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(json!({ "status": "NOT_FOUND", "message": "Ticker not found" })),
                    )
                }
            };
            (
                StatusCode::OK,
                Json(json!({
                    "status": "OK",
                    "results": [
                        { "t": 1704171600000i64, "o": closes[0], "h": closes[0], "l": closes[0], "c": closes[0], "v": 1000.0, "vw": closes[0] },
                        { "t": 1704258000000i64, "o": closes[1], "h": closes[1], "l": closes[1], "c": closes[1], "v": 2000.0, "vw": closes[1] }
                    ]
                })),
            )
        }

        async fn prev(Path(symbol): Path<String>) -> Json<Value> {
            if symbol == "AAA" {
                Json(json!({ "status": "OK", "results": [{ "c": 20.0 }] }))
            } else {
                Json(json!({ "status": "NOT_FOUND" }))
            }
        }

        async fn tickers(
            axum::extract::State(log): axum::extract::State<SearchLog>,
            Query(q): Query<HashMap<String, String>>,
        ) -> Json<Value> {
            log.lock().unwrap().push(q);
            Json(json!({
                "status": "OK",
                "count": 2,
                "results": [
                    { "ticker": "AAA", "name": "Alpha Holdings", "market": "stocks" },
                    { "ticker": "AAB", "name": "Alpha Beta Inc." }
                ]
            }))
        }

        let log = SearchLog::default();
        let stub = Router::new()
            .route("/v2/aggs/ticker/:symbol/prev", get(prev))
            .route(
                "/v2/aggs/ticker/:symbol/range/:mult/:span/:from/:to",
                get(aggs),
            )
            .route("/v3/reference/tickers", get(tickers))
            .with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, stub).await.unwrap();
        });
        (format!("http://{}", addr), log)
    }

    async fn stub_app() -> (Router, SearchLog) {
        let (base_url, log) = spawn_stub_polygon().await;
        let config = ServerConfig {
            polygon_base_url: base_url,
            polygon_rate_limit: 1000,
            ..ServerConfig::default()
        };
        (app_with(config), log)
    }

    fn keyed_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(API_KEY_HEADER, "test-key")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_symbols_against_stub() {
        let (app, log) = stub_app().await;
        let response = app.oneshot(keyed_get("/api/symbols/search?q=alpha")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["data"],
            json!([
                { "symbol": "AAA", "name": "Alpha Holdings" },
                { "symbol": "AAB", "name": "Alpha Beta Inc." }
            ])
        );

        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let query = &sent[0];
        assert_eq!(query["search"], "alpha");
        assert_eq!(query["active"], "true");
        assert_eq!(query["sort"], "ticker");
        assert_eq!(query["order"], "asc");
        assert_eq!(query["limit"], "10");
        assert_eq!(query["apiKey"], "test-key");
    }

    #[tokio::test]
    async fn test_search_limit_is_clamped() {
        let (app, log) = stub_app().await;
        for uri in ["/api/symbols/search?q=a&limit=500", "/api/symbols/search?q=a&limit=0"] {
            let response = app.clone().oneshot(keyed_get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limits: Vec<String> = log.lock().unwrap().iter().map(|q| q["limit"].clone()).collect();
        assert_eq!(limits, vec!["50", "1"]);
    }

    #[tokio::test]
    async fn test_blank_search_skips_upstream() {
        let (app, log) = stub_app().await;
        let response = app.oneshot(keyed_get("/api/symbols/search?q=%20%20")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"], json!([]));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_rejects_symbol_with_path_characters() {
        let (app, _) = stub_app().await;
        let response = app
            .oneshot(keyed_get("/api/symbols/AA%3FB/validate"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "Invalid symbol: AA?B");
    }

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let mut request = post_json(
            "/api/portfolio/analyze",
            json!({
                "holdings": [
                    { "symbol": "AAA", "weight": 50.0 },
                    { "symbol": "BBB", "weight": 30.0 },
                    { "symbol": "BAD", "weight": 20.0 }
                ],
                "start_date": "2024-01-01",
                "end_date": "2024-01-05"
            }),
        );
        request
            .headers_mut()
            .insert(API_KEY_HEADER, HeaderValue::from_static("test-key"));

        let (app, _) = stub_app().await;
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = &body_json(response).await["data"];

        let points = data["portfolio"]["points"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["date"], "2024-01-02");
        assert_relative_eq!(points[0]["value"].as_f64().unwrap(), 80.0);
        assert_relative_eq!(points[1]["value"].as_f64().unwrap(), 130.0);

        assert_eq!(data["analyzed_symbols"], json!(["AAA", "BBB"]));
        assert_eq!(data["failures"][0]["symbol"], "BAD");
        assert!(data["failures"][0]["message"]
            .as_str()
            .unwrap()
            .contains("Ticker not found"));
        assert_eq!(data["price_chart"]["data"].as_array().unwrap().len(), 3);
        assert_eq!(data["statistics"][0]["display"][2], "+100.00%");
    }

    #[tokio::test]
    async fn test_validate_symbol_against_stub() {
        let (app, _) = stub_app().await;
        for (symbol, valid) in [("aaa", true), ("ZZZ", false)] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/symbols/{}/validate", symbol))
                        .header(API_KEY_HEADER, "test-key")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let data = &body_json(response).await["data"];
            assert_eq!(data["valid"], valid);
            assert_eq!(data["symbol"], symbol.to_uppercase());
        }
    }
}
