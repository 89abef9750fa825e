use thiserror::Error;

use crate::Metric;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Empty series: {0}")]
    EmptySeries(String),

    #[error("Cannot normalize {metric} for {symbol}: first value is zero")]
    ZeroBase { symbol: String, metric: Metric },

    #[error("No weight given for {0}")]
    MissingWeight(String),

    #[error("Invalid weight for {symbol}: {weight} (must be between 0 and 100)")]
    InvalidWeight { symbol: String, weight: f64 },

    #[error("Too many holdings: {0} (at most {max})", max = crate::MAX_HOLDINGS)]
    TooManyHoldings(usize),

    #[error("Duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Total weight: {0}% (should be 100%)")]
    Unbalanced(f64),

    #[error("Please add at least one stock to your portfolio.")]
    NoHoldings,

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Error fetching data for {symbol}: {reason}")]
    MissingResults { symbol: String, reason: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl PortfolioError {
    /// True for errors caused by the user's form input rather than the data source.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PortfolioError::InvalidWeight { .. }
                | PortfolioError::TooManyHoldings(_)
                | PortfolioError::DuplicateSymbol(_)
                | PortfolioError::InvalidSymbol(_)
                | PortfolioError::Unbalanced(_)
                | PortfolioError::NoHoldings
                | PortfolioError::InvalidDateRange { .. }
        )
    }
}
