use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Holding, PortfolioError, WeightMap};

/// Maximum number of holdings in one portfolio
pub const MAX_HOLDINGS: usize = 5;

/// Suggestions offered before the user types anything
pub const POPULAR_SYMBOLS: &[&str] = &[
    "AAPL", "GOOGL", "MSFT", "IBM", "AMZN", "TSLA", "META", "NVDA", "JPM", "V",
];

/// Cleaned-up portfolio form: usable holdings in the order the user entered them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PortfolioSpec {
    pub holdings: Vec<Holding>,
}

impl PortfolioSpec {
    /// Apply the form rules to raw rows.
    ///
    /// Symbols are trimmed and upper-cased; rows with a blank symbol or a zero weight
    /// are dropped. The weight total is not checked here, see [`PortfolioSpec::require_balanced`].
    pub fn from_rows(rows: &[Holding]) -> Result<Self, PortfolioError> {
        if rows.len() > MAX_HOLDINGS {
            return Err(PortfolioError::TooManyHoldings(rows.len()));
        }

        let mut seen = HashSet::new();
        let mut holdings = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol = row.symbol.trim().to_uppercase();

            if !(0.0..=100.0).contains(&row.weight) {
                return Err(PortfolioError::InvalidWeight {
                    symbol,
                    weight: row.weight,
                });
            }
            if symbol.is_empty() || row.weight == 0.0 {
                continue;
            }
            if !seen.insert(symbol.clone()) {
                return Err(PortfolioError::DuplicateSymbol(symbol));
            }

            holdings.push(Holding {
                symbol,
                weight: row.weight,
            });
        }

        Ok(Self { holdings })
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.holdings.iter().map(|h| h.symbol.as_str())
    }

    pub fn weights(&self) -> WeightMap {
        self.holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.weight))
            .collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight).sum()
    }

    /// Non-blocking warning shown next to the form while the total is off.
    pub fn weight_warning(&self) -> Option<String> {
        if self.weights().is_balanced() {
            None
        } else {
            Some(PortfolioError::Unbalanced(self.total_weight()).to_string())
        }
    }

    /// Analysis only runs on a non-empty portfolio whose weights total exactly 100.
    pub fn require_balanced(&self) -> Result<(), PortfolioError> {
        if self.is_empty() {
            return Err(PortfolioError::NoHoldings);
        }
        if !self.weights().is_balanced() {
            return Err(PortfolioError::Unbalanced(self.total_weight()));
        }
        Ok(())
    }
}

/// Start must not be after end.
pub fn check_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), PortfolioError> {
    if start > end {
        return Err(PortfolioError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}
