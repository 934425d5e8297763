//! Daily price history sources: Yahoo Finance chart API and local CSV files.

use crate::error::MarketDataError;
use crate::storage_utils::MarketConfig;
use crate::wick_features::{PriceField, PriceFrame};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Anything that can hand back one ticker's daily bars for `[start, end)`.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch_daily(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceFrame, MarketDataError>;
}

// --- Yahoo Finance ---

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartFault>,
}

#[derive(Deserialize, Debug)]
struct ChartFault {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    // seconds east of UTC for the listing exchange
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Deserialize, Debug)]
struct QuoteColumns {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

pub struct YahooChartClient {
    client: Client,
    base_url: String,
}

impl YahooChartClient {
    pub fn new(config: &MarketConfig) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(MarketDataError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn parse_chart(ticker: &str, body: &[u8]) -> Result<PriceFrame, MarketDataError> {
    let envelope: ChartEnvelope =
        serde_json::from_slice(body).map_err(|e| MarketDataError::Parse(e.to_string()))?;

    if let Some(fault) = envelope.chart.error {
        if fault.code.eq_ignore_ascii_case("Not Found") {
            return Err(MarketDataError::NotFound(ticker.to_string()));
        }
        return Err(MarketDataError::Parse(
            fault.description.unwrap_or(fault.code),
        ));
    }

    let result = envelope
        .chart
        .result
        .and_then(|mut results| results.pop())
        .ok_or(MarketDataError::Empty)?;

    if result.timestamp.is_empty() {
        return Err(MarketDataError::Empty);
    }

    let offset = result.meta.gmtoffset;
    let dates = result
        .timestamp
        .iter()
        .map(|&ts| {
            DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| MarketDataError::Parse(format!("invalid timestamp {ts}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut frame = PriceFrame::new(dates);
    if let Some(quote) = result.indicators.quote.into_iter().next() {
        let columns = [
            (PriceField::Open, quote.open),
            (PriceField::High, quote.high),
            (PriceField::Low, quote.low),
            (PriceField::Close, quote.close),
            (PriceField::Volume, quote.volume),
        ];
        for (field, values) in columns {
            if let Some(values) = values {
                frame = frame.with_column(field, values);
            }
        }
    }

    Ok(frame.sorted_by_date())
}

fn status_error(status: StatusCode, ticker: &str) -> Option<MarketDataError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(MarketDataError::Auth(status.as_u16()))
    } else if status == StatusCode::NOT_FOUND {
        Some(MarketDataError::NotFound(ticker.to_string()))
    } else if !status.is_success() {
        Some(MarketDataError::Http(status.as_u16()))
    } else {
        None
    }
}

#[async_trait]
impl PriceHistorySource for YahooChartClient {
    async fn fetch_daily(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceFrame, MarketDataError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let query = [
            ("period1", midnight_utc(start).to_string()),
            ("period2", midnight_utc(end).to_string()),
            ("interval", "1d".to_string()),
            ("includePrePost", "false".to_string()),
        ];

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(MarketDataError::from_reqwest)?;

        if let Some(err) = status_error(response.status(), ticker) {
            return Err(err);
        }

        let body = response.bytes().await.map_err(MarketDataError::from_reqwest)?;
        let frame = parse_chart(ticker, &body)?;

        // Yahoo sometimes leaks a bar at or past period2.
        Ok(keep_range(frame, start, end))
    }
}

fn keep_range(frame: PriceFrame, start: NaiveDate, end: NaiveDate) -> PriceFrame {
    let keep: Vec<bool> = frame
        .dates()
        .iter()
        .map(|d| *d >= start && *d < end)
        .collect();
    if keep.iter().all(|k| *k) {
        return frame;
    }

    let dates = frame
        .dates()
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(d, _)| *d)
        .collect();
    let mut filtered = PriceFrame::new(dates);
    for field in PriceField::REQUIRED {
        if let Some(values) = frame.column(field) {
            let values = values
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| *v)
                .collect();
            filtered = filtered.with_column(field, values);
        }
    }
    filtered
}

// --- Local CSV ---

/// Reads daily bars from a delimited file with a header row.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

const DATE_HEADERS: &[&str] = &["date", "datetime", "timestamp"];

fn parse_date_cell(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    let day = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_csv(
    bytes: &[u8],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceFrame, MarketDataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| MarketDataError::Parse(e.to_string()))?
        .clone();

    let date_idx = headers
        .iter()
        .position(|h| DATE_HEADERS.iter().any(|d| h.eq_ignore_ascii_case(d)))
        .ok_or_else(|| MarketDataError::Parse("no Date column in header".to_string()))?;
    let field_idx: Vec<(PriceField, usize)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| PriceField::from_name(h).map(|f| (f, i)))
        .collect();

    let mut dates = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); field_idx.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| MarketDataError::Parse(e.to_string()))?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = parse_date_cell(raw_date).ok_or_else(|| {
            MarketDataError::Parse(format!("row {}: bad date {:?}", line + 2, raw_date))
        })?;
        if date < start || date >= end {
            continue;
        }

        for (slot, (field, idx)) in columns.iter_mut().zip(&field_idx) {
            let cell = record.get(*idx).unwrap_or_default();
            let value = if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(cell.parse::<f64>().map_err(|e| {
                    MarketDataError::Parse(format!("row {}: {} {:?}: {}", line + 2, field, cell, e))
                })?)
            };
            slot.push(value);
        }
        dates.push(date);
    }

    if dates.is_empty() {
        return Err(MarketDataError::Empty);
    }

    let mut frame = PriceFrame::new(dates);
    for ((field, _), values) in field_idx.into_iter().zip(columns) {
        frame = frame.with_column(field, values);
    }
    Ok(frame.sorted_by_date())
}

#[async_trait]
impl PriceHistorySource for CsvFileSource {
    async fn fetch_daily(
        &self,
        _ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceFrame, MarketDataError> {
        let bytes = tokio::fs::read(&self.path).await?;
        parse_csv(&bytes, start, end)
    }
}
