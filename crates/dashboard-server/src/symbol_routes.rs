//! Symbol Search API Routes
//!
//! Ticker search, existence checks and the quick-pick list used by the portfolio form.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use portfolio_core::POPULAR_SYMBOLS;
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::IntoParams)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SymbolSearchResult {
    pub symbol: String,
    pub name: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SymbolValidation {
    pub symbol: String,
    pub valid: bool,
}

pub fn symbol_routes() -> Router<AppState> {
    Router::new()
        .route("/api/symbols/search", get(search_symbols))
        .route("/api/symbols/popular", get(popular_symbols))
        .route("/api/symbols/:symbol/validate", get(validate_symbol))
}

#[utoipa::path(
    get,
    path = "/api/symbols/search",
    params(SearchQuery),
    responses((status = 200, description = "Matching ticker symbols")),
    tag = "Symbols"
)]
pub(crate) async fn search_symbols(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<SymbolSearchResult>>>, AppError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(ApiResponse::success(Vec::new())));
    }

    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let polygon = state.polygon_for(&headers)?;

    let results = polygon.search_tickers(q, limit).await?;

    let symbols = results
        .into_iter()
        .map(|r| SymbolSearchResult {
            symbol: r.symbol,
            name: r.name,
        })
        .collect();

    Ok(Json(ApiResponse::success(symbols)))
}

#[utoipa::path(
    get,
    path = "/api/symbols/popular",
    responses((status = 200, description = "Suggested symbols for the portfolio form")),
    tag = "Symbols"
)]
pub(crate) async fn popular_symbols() -> Json<ApiResponse<Vec<&'static str>>> {
    Json(ApiResponse::success(POPULAR_SYMBOLS.to_vec()))
}

#[utoipa::path(
    get,
    path = "/api/symbols/{symbol}/validate",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Whether the symbol exists upstream")),
    tag = "Symbols"
)]
pub(crate) async fn validate_symbol(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<SymbolValidation>>, AppError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("Symbol must not be empty"),
        ));
    }

    let polygon = state.polygon_for(&headers)?;
    let valid = polygon.validate_symbol(&symbol).await?;
    if !valid {
        tracing::info!("Invalid symbol: {}", symbol);
    }

    Ok(Json(ApiResponse::success(SymbolValidation { symbol, valid })))
}
