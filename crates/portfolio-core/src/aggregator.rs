//! Normalization and weighted blending of per-symbol daily series.
//!
//! Every series is rebased so its first value is 100, which makes a $10 stock and a
//! $500 stock (or a thin and a heavy volume profile) comparable on one axis. The
//! portfolio line is the weighted sum of those rebased series over the dates every
//! symbol traded.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use crate::{CompositeSeries, Metric, PortfolioError, Point, Series, WeightMap};

pub struct PortfolioAggregator;

impl PortfolioAggregator {
    /// Rebase `metric` of `series` to 100 at its first date.
    pub fn normalize(series: &Series, metric: Metric) -> Result<Vec<Point>, PortfolioError> {
        let first = series
            .first()
            .ok_or_else(|| PortfolioError::EmptySeries(series.symbol.clone()))?;

        let base = metric.value(first);
        if base == 0.0 {
            return Err(PortfolioError::ZeroBase {
                symbol: series.symbol.clone(),
                metric,
            });
        }

        Ok(series
            .bars()
            .iter()
            .map(|bar| Point {
                date: bar.date,
                value: metric.value(bar) / base * 100.0,
            })
            .collect())
    }

    /// Dates present in every series, ascending.
    pub fn intersect_dates(series_set: &[Series]) -> Vec<NaiveDate> {
        let mut iter = series_set.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };

        let mut common: BTreeSet<NaiveDate> = first.dates().collect();
        for series in iter {
            let dates: BTreeSet<NaiveDate> = series.dates().collect();
            common.retain(|d| dates.contains(d));
            if common.is_empty() {
                break;
            }
        }

        common.into_iter().collect()
    }

    /// Each series paired with its own normalized points, on its full date range.
    pub fn normalized_traces(
        series_set: &[Series],
        metric: Metric,
    ) -> Result<Vec<(&Series, Vec<Point>)>, PortfolioError> {
        series_set
            .iter()
            .map(|series| Ok((series, Self::normalize(series, metric)?)))
            .collect()
    }

    /// Weighted sum of normalized series over the common dates.
    ///
    /// Weights are used as given: a total other than 100 scales the result rather
    /// than being corrected here. Weights for symbols absent from `series_set`
    /// contribute nothing.
    pub fn aggregate(
        series_set: &[Series],
        weights: &WeightMap,
        metric: Metric,
    ) -> Result<CompositeSeries, PortfolioError> {
        let mut normalized: Vec<(HashMap<NaiveDate, f64>, f64)> = Vec::with_capacity(series_set.len());
        for series in series_set {
            let weight = weights
                .get(&series.symbol)
                .ok_or_else(|| PortfolioError::MissingWeight(series.symbol.clone()))?;
            let lookup = Self::normalize(series, metric)?
                .into_iter()
                .map(|p| (p.date, p.value))
                .collect();
            normalized.push((lookup, weight));
        }

        let points = Self::intersect_dates(series_set)
            .into_iter()
            .map(|date| {
                let value = normalized
                    .iter()
                    .map(|(lookup, weight)| lookup.get(&date).copied().unwrap_or(0.0) * weight / 100.0)
                    .sum();
                Point { date, value }
            })
            .collect();

        Ok(CompositeSeries { metric, points })
    }
}
