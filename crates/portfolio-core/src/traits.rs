use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{PortfolioError, Series};

/// Source of daily bars for one symbol over an inclusive date range
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn daily_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Series, PortfolioError>;
}
