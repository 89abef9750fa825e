//! Plotly figure JSON for the price and volume charts.
//!
//! Both figures share one layout so the browser can line them up on a common
//! date axis and mirror hover and zoom between them.

use chrono::NaiveDate;
use portfolio_core::{CompositeSeries, Metric, PortfolioAggregator, PortfolioError, Series, WeightMap};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
    pub line: Line,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customdata: Option<Vec<serde_json::Value>>,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Line {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Title {
    pub text: String,
}

impl Title {
    fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Legend {
    pub yanchor: &'static str,
    pub y: f64,
    pub xanchor: &'static str,
    pub x: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeSlider {
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct XAxis {
    pub title: Title,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[NaiveDate; 2]>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub showspikes: bool,
    pub spikemode: &'static str,
    pub spikesnap: &'static str,
    pub showline: bool,
    pub showgrid: bool,
    pub gridcolor: &'static str,
    pub rangeslider: RangeSlider,
}

#[derive(Debug, Clone, Serialize)]
pub struct YAxis {
    pub title: Title,
    pub gridcolor: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub title: Title,
    pub height: u32,
    pub showlegend: bool,
    pub legend: Legend,
    pub xaxis: XAxis,
    pub yaxis: YAxis,
    pub hovermode: &'static str,
    pub hoverdistance: i32,
    pub spikedistance: i32,
    pub dragmode: &'static str,
    pub margin: Margin,
    pub paper_bgcolor: &'static str,
    pub plot_bgcolor: &'static str,
}

const GRID_COLOR: &str = "#ebf0f8";

fn layout(title: &str, y_title: &str, x_title: &str, range: Option<[NaiveDate; 2]>) -> Layout {
    Layout {
        title: Title::new(title),
        height: 400,
        showlegend: true,
        legend: Legend {
            yanchor: "top",
            y: 0.99,
            xanchor: "left",
            x: 0.01,
        },
        xaxis: XAxis {
            title: Title::new(x_title),
            range,
            kind: "date",
            showspikes: true,
            spikemode: "across",
            spikesnap: "cursor",
            showline: true,
            showgrid: true,
            gridcolor: GRID_COLOR,
            rangeslider: RangeSlider { visible: false },
        },
        yaxis: YAxis {
            title: Title::new(y_title),
            gridcolor: GRID_COLOR,
        },
        hovermode: "x unified",
        hoverdistance: 1,
        spikedistance: 1000,
        dragmode: "zoom",
        margin: Margin { l: 50, r: 50, t: 50, b: 50 },
        paper_bgcolor: "white",
        plot_bgcolor: "white",
    }
}

/// First and last composite dates; `None` when the symbols share no dates.
fn shared_range(composite: &CompositeSeries) -> Option<[NaiveDate; 2]> {
    match (composite.points.first(), composite.points.last()) {
        (Some(first), Some(last)) => Some([first.date, last.date]),
        _ => None,
    }
}

/// Bars without a VWAP show `n/a` in the hover instead of a number.
fn vwap_label(vwap: Option<f64>) -> String {
    match vwap {
        Some(v) => format!("${:.2}", v),
        None => "n/a".to_string(),
    }
}

fn trace_name(symbol: &str, weights: &WeightMap) -> String {
    match weights.get(symbol) {
        Some(w) => format!("{} ({}%)", symbol, w),
        None => symbol.to_string(),
    }
}

fn composite_trace(name: &str, composite: &CompositeSeries) -> Trace {
    Trace {
        kind: "scatter",
        mode: "lines",
        name: name.to_string(),
        x: composite.dates(),
        y: composite.values(),
        line: Line {
            dash: None,
            width: Some(3.0),
        },
        opacity: None,
        customdata: None,
        hovertemplate: [
            format!("<b>{}</b>", name).as_str(),
            "Date: %{x}",
            "Value: %{y:.2f}",
            "<extra></extra>",
        ]
        .join("<br>"),
    }
}

/// Normalized closes per symbol plus the portfolio line.
pub fn price_chart(
    series_set: &[Series],
    weights: &WeightMap,
    composite: &CompositeSeries,
) -> Result<Figure, PortfolioError> {
    let mut data = Vec::with_capacity(series_set.len() + 1);

    for (series, normalized) in PortfolioAggregator::normalized_traces(series_set, Metric::Close)? {
        data.push(Trace {
            kind: "scatter",
            mode: "lines",
            name: trace_name(&series.symbol, weights),
            x: normalized.iter().map(|p| p.date).collect(),
            y: normalized.iter().map(|p| p.value).collect(),
            line: Line {
                dash: Some("dash"),
                width: None,
            },
            opacity: None,
            customdata: Some(
                series
                    .bars()
                    .iter()
                    .map(|b| json!([b.close, vwap_label(b.vwap)]))
                    .collect(),
            ),
            hovertemplate: [
                format!("<b>{}</b>", series.symbol).as_str(),
                "Date: %{x}",
                "Normalized: %{y:.2f}",
                "Price: $%{customdata[0]:.2f}",
                "VWAP: %{customdata[1]}",
                "<extra></extra>",
            ]
            .join("<br>"),
        });
    }
    data.push(composite_trace("Portfolio", composite));

    Ok(Figure {
        data,
        layout: layout(
            "Portfolio Price Performance (Normalized to 100)",
            "Value",
            "",
            shared_range(composite),
        ),
    })
}

/// Normalized volume per symbol plus the weighted combined volume.
pub fn volume_chart(
    series_set: &[Series],
    weights: &WeightMap,
    composite: &CompositeSeries,
) -> Result<Figure, PortfolioError> {
    let mut data = Vec::with_capacity(series_set.len() + 1);

    for (series, normalized) in PortfolioAggregator::normalized_traces(series_set, Metric::Volume)? {
        data.push(Trace {
            kind: "scatter",
            mode: "lines",
            name: trace_name(&series.symbol, weights),
            x: normalized.iter().map(|p| p.date).collect(),
            y: normalized.iter().map(|p| p.value).collect(),
            line: Line {
                dash: Some("dash"),
                width: None,
            },
            opacity: Some(0.7),
            customdata: Some(series.bars().iter().map(|b| json!(b.volume)).collect()),
            hovertemplate: [
                format!("<b>{}</b>", series.symbol).as_str(),
                "Date: %{x}",
                "Normalized: %{y:.2f}",
                "Volume: %{customdata:,.0f}",
                "<extra></extra>",
            ]
            .join("<br>"),
        });
    }
    data.push(composite_trace("Combined Volume", composite));

    Ok(Figure {
        data,
        layout: layout(
            "Trading Volume (Normalized to 100)",
            "Volume Index",
            "Date",
            shared_range(composite),
        ),
    })
}
