use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::{Duration, NaiveDate, Utc};
use portfolio_core::{check_date_range, Holding, PortfolioError, PortfolioSpec};
use serde::{Deserialize, Serialize};

use crate::analysis::{run_analysis, AnalysisReport};
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PortfolioForm {
    pub holdings: Vec<Holding>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AnalyzeRequest {
    pub holdings: Vec<Holding>,
    /// Defaults to `end_date` minus the configured lookback
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Defaults to today (UTC)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FormCheck {
    pub holdings: Vec<Holding>,
    pub total_weight: f64,
    pub balanced: bool,
    pub can_analyze: bool,
    pub warning: Option<String>,
    pub info: Option<String>,
}

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        .route("/api/portfolio/validate", post(validate_portfolio))
        .route("/api/portfolio/analyze", post(analyze_portfolio))
}

#[utoipa::path(
    post,
    path = "/api/portfolio/validate",
    request_body = PortfolioForm,
    responses(
        (status = 200, description = "Cleaned holdings, weight total and any warning"),
        (status = 422, description = "A form rule was violated")
    ),
    tag = "Portfolio"
)]
pub(crate) async fn validate_portfolio(
    Json(form): Json<PortfolioForm>,
) -> Result<Json<ApiResponse<FormCheck>>, AppError> {
    let spec = PortfolioSpec::from_rows(&form.holdings)?;
    let info = spec
        .is_empty()
        .then(|| "Please add at least one stock to your portfolio.".to_string());

    Ok(Json(ApiResponse::success(FormCheck {
        total_weight: spec.total_weight(),
        balanced: spec.weights().is_balanced(),
        can_analyze: spec.require_balanced().is_ok(),
        warning: spec.weight_warning(),
        info,
        holdings: spec.holdings,
    })))
}

#[utoipa::path(
    post,
    path = "/api/portfolio/analyze",
    request_body = AnalyzeRequest,
    params(("X-Polygon-Api-Key" = Option<String>, Header, description = "Polygon.io API key; falls back to the server's POLYGON_API_KEY")),
    responses(
        (status = 200, description = "Composite series, chart figures and per-symbol statistics"),
        (status = 401, description = "No API key available"),
        (status = 422, description = "Form rules violated or weights do not total 100%")
    ),
    tag = "Portfolio"
)]
pub(crate) async fn analyze_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<AnalysisReport>>, AppError> {
    let spec = PortfolioSpec::from_rows(&request.holdings)?;
    spec.require_balanced()?;

    let end = request.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start = match request.start_date {
        Some(start) => start,
        None => lookback_start(end, state.config.default_lookback_days)?,
    };
    check_date_range(start, end)?;

    let polygon = state.polygon_for(&headers)?;

    tracing::info!(
        "Analyzing {} holdings from {} to {}",
        spec.holdings.len(),
        start,
        end
    );
    let report = run_analysis(&polygon, &spec, start, end).await?;

    Ok(Json(ApiResponse::success(report)))
}

/// `end` minus `days`, or `InvalidDateRange` when that falls outside the calendar.
fn lookback_start(end: NaiveDate, days: i64) -> Result<NaiveDate, PortfolioError> {
    Duration::try_days(days)
        .and_then(|lookback| end.checked_sub_signed(lookback))
        .ok_or_else(|| PortfolioError::InvalidDateRange {
            start: format!("{} minus {} days", end, days),
            end: end.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookback_start() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            lookback_start(end, 30),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_lookback_start_out_of_calendar() {
        assert!(matches!(
            lookback_start(NaiveDate::MIN, 30),
            Err(PortfolioError::InvalidDateRange { .. })
        ));
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!(lookback_start(end, i64::MAX).is_err());
    }
}
