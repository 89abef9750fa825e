use chrono::NaiveDate;
use portfolio_core::{
    BarSource, CompositeSeries, Holding, Metric, PortfolioAggregator, PortfolioError, PortfolioSpec,
    Series, SymbolStats,
};
use serde::Serialize;

use crate::charts::{self, Figure};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FetchFailure {
    pub symbol: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct StatsRow {
    #[serde(flatten)]
    pub stats: SymbolStats,
    /// Latest close, VWAP, change, average volume and weight, formatted for the table
    #[schema(value_type = Vec<String>)]
    pub display: [String; 5],
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AnalysisReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub holdings: Vec<Holding>,
    /// Symbols that made it into the charts, in form order
    pub analyzed_symbols: Vec<String>,
    pub portfolio: Option<CompositeSeries>,
    pub combined_volume: Option<CompositeSeries>,
    #[schema(value_type = Option<Object>)]
    pub price_chart: Option<Figure>,
    #[schema(value_type = Option<Object>)]
    pub volume_chart: Option<Figure>,
    pub statistics: Vec<StatsRow>,
    pub failures: Vec<FetchFailure>,
    pub warnings: Vec<String>,
}

/// Fetch every holding one after another, then blend and chart what arrived.
///
/// A symbol that cannot be fetched or normalized is reported in `failures` and left
/// out; the rest of the portfolio is still analyzed.
pub async fn run_analysis(
    source: &dyn BarSource,
    spec: &PortfolioSpec,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<AnalysisReport, PortfolioError> {
    let weights = spec.weights();
    let mut series_set: Vec<Series> = Vec::with_capacity(spec.holdings.len());
    let mut failures = Vec::new();

    for symbol in spec.symbols() {
        match source.daily_series(symbol, start, end).await {
            Ok(series) => match usable(&series) {
                Ok(()) => series_set.push(series),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", symbol, e);
                    failures.push(FetchFailure {
                        symbol: symbol.to_string(),
                        message: e.to_string(),
                    });
                }
            },
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", symbol, e);
                failures.push(FetchFailure {
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    let mut report = AnalysisReport {
        start_date: start,
        end_date: end,
        holdings: spec.holdings.clone(),
        analyzed_symbols: series_set.iter().map(|s| s.symbol.clone()).collect(),
        portfolio: None,
        combined_volume: None,
        price_chart: None,
        volume_chart: None,
        statistics: Vec::new(),
        failures,
        warnings: Vec::new(),
    };

    if series_set.is_empty() {
        report
            .warnings
            .push("No data could be fetched for any symbol in the portfolio.".to_string());
        return Ok(report);
    }

    let portfolio = PortfolioAggregator::aggregate(&series_set, &weights, Metric::Close)?;
    let combined_volume = PortfolioAggregator::aggregate(&series_set, &weights, Metric::Volume)?;

    if portfolio.is_empty() {
        report.warnings.push(
            "The selected symbols share no trading dates in this range; the portfolio line is empty."
                .to_string(),
        );
    }
    if !report.failures.is_empty() {
        report.warnings.push(format!(
            "Portfolio excludes {} symbol(s) that could not be loaded; their weight is left out.",
            report.failures.len()
        ));
    }

    report.price_chart = Some(charts::price_chart(&series_set, &weights, &portfolio)?);
    report.volume_chart = Some(charts::volume_chart(&series_set, &weights, &combined_volume)?);

    for series in &series_set {
        let weight = weights.get(&series.symbol).unwrap_or(0.0);
        let stats = SymbolStats::from_series(series, weight)?;
        let display = stats.display_row();
        report.statistics.push(StatsRow { stats, display });
    }

    tracing::info!(
        "Analyzed {} of {} symbols over {} common dates",
        series_set.len(),
        spec.holdings.len(),
        portfolio.points.len()
    );

    report.portfolio = Some(portfolio);
    report.combined_volume = Some(combined_volume);
    Ok(report)
}

/// A fetched series must be normalizable on both charts.
fn usable(series: &Series) -> Result<(), PortfolioError> {
    if series.is_empty() {
        return Err(PortfolioError::MissingResults {
            symbol: series.symbol.clone(),
            reason: "no bars in the selected date range".to_string(),
        });
    }
    PortfolioAggregator::normalize(series, Metric::Close)?;
    PortfolioAggregator::normalize(series, Metric::Volume)?;
    Ok(())
}
