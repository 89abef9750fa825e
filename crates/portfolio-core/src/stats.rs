use crate::{PortfolioError, Series, SymbolStats};

impl SymbolStats {
    /// Summary row for one fetched series.
    pub fn from_series(series: &Series, weight: f64) -> Result<Self, PortfolioError> {
        let (first, last) = match (series.first(), series.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(PortfolioError::EmptySeries(series.symbol.clone())),
        };

        let price_change_percent = if first.close != 0.0 {
            (last.close / first.close - 1.0) * 100.0
        } else {
            0.0
        };

        let average_volume =
            series.bars().iter().map(|b| b.volume).sum::<f64>() / series.len() as f64;

        Ok(Self {
            symbol: series.symbol.clone(),
            latest_close: last.close,
            latest_vwap: last.vwap,
            price_change_percent,
            average_volume,
            weight,
        })
    }

    /// Human-readable cells: close, VWAP, change, average volume, weight.
    pub fn display_row(&self) -> [String; 5] {
        [
            format!("${:.2}", self.latest_close),
            self.latest_vwap
                .map(|v| format!("${:.2}", v))
                .unwrap_or_else(|| "n/a".to_string()),
            format!("{:+.2}%", self.price_change_percent),
            group_thousands(self.average_volume.trunc() as u64),
            format!("{}%", self.weight),
        ]
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
