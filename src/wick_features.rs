//! Candle wick statistics: per-day wick/body metrics and their averages.

use crate::error::FeatureError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// --- Price Table ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const REQUIRED: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::Volume => "Volume",
        }
    }

    /// Case-insensitive lookup of a column header.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::REQUIRED
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Columnar daily price table as delivered by a data source.
///
/// A column that was never inserted is a missing column; a `None` cell is a
/// missing value for that day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFrame {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<PriceField, Vec<Option<f64>>>,
}

impl PriceFrame {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: BTreeMap::new(),
        }
    }

    /// Attaches a column, padding with `None` (or truncating) to the index length.
    pub fn with_column(mut self, field: PriceField, mut values: Vec<Option<f64>>) -> Self {
        values.resize(self.dates.len(), None);
        self.columns.insert(field, values);
        self
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, field: PriceField) -> Option<&[Option<f64>]> {
        self.columns.get(&field).map(Vec::as_slice)
    }

    pub fn missing_columns(&self) -> Vec<PriceField> {
        PriceField::REQUIRED
            .into_iter()
            .filter(|field| !self.columns.contains_key(field))
            .collect()
    }

    /// Orders rows by date; when a date repeats, the later record wins.
    pub fn sorted_by_date(self) -> Self {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);

        let mut kept: Vec<usize> = Vec::with_capacity(order.len());
        for i in order {
            match kept.last_mut() {
                Some(last) if self.dates[*last] == self.dates[i] => *last = i,
                _ => kept.push(i),
            }
        }

        let dates = kept.iter().map(|&i| self.dates[i]).collect();
        let columns = self
            .columns
            .into_iter()
            .map(|(field, values)| (field, kept.iter().map(|&i| values[i]).collect::<Vec<_>>()))
            .collect();

        Self { dates, columns }
    }
}

// --- Derived Metrics ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WickMetrics {
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub body_size: f64,
    pub total_range: f64,
    pub wick_score: f64,
}

impl WickMetrics {
    pub fn from_candle(candle: &Candle) -> Self {
        let body_high = candle.open.max(candle.close);
        let body_low = candle.open.min(candle.close);
        let upper_wick = candle.high - body_high;
        let lower_wick = body_low - candle.low;

        Self {
            upper_wick,
            lower_wick,
            body_size: (candle.close - candle.open).abs(),
            total_range: candle.high - candle.low,
            wick_score: upper_wick + lower_wick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WickRow {
    pub date: NaiveDate,
    pub candle: Candle,
    pub metrics: WickMetrics,
}

/// Cleaned price rows carrying their derived metrics, in date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WickTable {
    rows: Vec<WickRow>,
}

impl WickTable {
    pub fn rows(&self) -> &[WickRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column means over every row. An empty table has no averages.
    pub fn averages(&self) -> Result<WickAverages, FeatureError> {
        if self.is_empty() {
            return Err(FeatureError::EmptyDataset);
        }

        let mut sum = WickAverages::default();
        for row in &self.rows {
            sum.upper_wick += row.metrics.upper_wick;
            sum.lower_wick += row.metrics.lower_wick;
            sum.body_size += row.metrics.body_size;
            sum.total_range += row.metrics.total_range;
            sum.wick_score += row.metrics.wick_score;
        }

        let n = self.rows.len() as f64;
        Ok(WickAverages {
            upper_wick: sum.upper_wick / n,
            lower_wick: sum.lower_wick / n,
            body_size: sum.body_size / n,
            total_range: sum.total_range / n,
            wick_score: sum.wick_score / n,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WickAverages {
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub body_size: f64,
    pub total_range: f64,
    pub wick_score: f64,
}

// --- Domain Logic ---

/// Drops incomplete rows and derives the wick metrics for the rest.
///
/// Fails with [`FeatureError::MissingColumns`] before touching any row when a
/// required column is absent. An empty result is not an error here.
pub fn augment(frame: &PriceFrame) -> Result<WickTable, FeatureError> {
    let missing = frame.missing_columns();
    if !missing.is_empty() {
        return Err(FeatureError::MissingColumns(missing));
    }

    let column = |field| frame.column(field).unwrap_or_default();
    let (open, high, low, close, volume) = (
        column(PriceField::Open),
        column(PriceField::High),
        column(PriceField::Low),
        column(PriceField::Close),
        column(PriceField::Volume),
    );

    let rows = frame
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(i, &date)| {
            let candle = Candle {
                open: open[i]?,
                high: high[i]?,
                low: low[i]?,
                close: close[i]?,
                volume: volume[i]?,
            };
            Some(WickRow {
                date,
                candle,
                metrics: WickMetrics::from_candle(&candle),
            })
        })
        .collect();

    Ok(WickTable { rows })
}

pub fn compute_wick_features(
    frame: &PriceFrame,
) -> Result<(WickTable, WickAverages), FeatureError> {
    let table = augment(frame)?;
    let averages = table.averages()?;
    Ok((table, averages))
}
