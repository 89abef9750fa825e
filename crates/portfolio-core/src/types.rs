use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One trading day for one symbol (OHLCV + VWAP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Daily bars for one symbol, ascending by date with no repeated dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub symbol: String,
    bars: Vec<Bar>,
}

impl Series {
    /// Sorts by date and drops repeated dates (the first bar for a date wins).
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.bars.iter().map(|b| b.date)
    }
}

/// Which bar field gets normalized and blended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Metric {
    Close,
    Volume,
}

impl Metric {
    pub fn value(&self, bar: &Bar) -> f64 {
        match self {
            Metric::Close => bar.close,
            Metric::Volume => bar.volume,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Close => write!(f, "close"),
            Metric::Volume => write!(f, "volume"),
        }
    }
}

/// A dated value on a normalized scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Point {
    pub date: NaiveDate,
    pub value: f64,
}

/// Weighted blend of normalized series over their common dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompositeSeries {
    pub metric: Metric,
    pub points: Vec<Point>,
}

impl CompositeSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// Symbol -> weight percentage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightMap(BTreeMap<String, f64>);

impl WeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, weight: f64) {
        self.0.insert(symbol.into(), weight);
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.0.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Weights add up to 100 (within float noise)
    pub fn is_balanced(&self) -> bool {
        (self.total() - 100.0).abs() < 1e-9
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(s, w)| (s.as_str(), *w))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for WeightMap {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, w)| (s.into(), w)).collect())
    }
}

/// One row of the portfolio form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Holding {
    pub symbol: String,
    pub weight: f64,
}

/// Per-symbol statistics table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SymbolStats {
    pub symbol: String,
    pub latest_close: f64,
    pub latest_vwap: Option<f64>,
    pub price_change_percent: f64,
    pub average_volume: f64,
    pub weight: f64,
}
