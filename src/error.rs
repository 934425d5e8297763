use thiserror::Error;

use crate::wick_features::PriceField;

fn field_list(fields: &[PriceField]) -> String {
    fields
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures of the wick feature computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("missing required columns: {}", field_list(.0))]
    MissingColumns(Vec<PriceField>),
    #[error("no complete rows left to average")]
    EmptyDataset,
}

/// Failures while acquiring daily price history.
#[derive(Error, Debug)]
pub enum MarketDataError {
    // transport level failure, connection refused, DNS, TLS
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("access denied by market data provider (HTTP {0})")]
    Auth(u16),
    #[error("ticker not found: {0}")]
    NotFound(String),
    #[error("market data provider answered HTTP {0}")]
    Http(u16),
    #[error("parse error: {0}")]
    Parse(String),
    // the range holds no trading days
    #[error("no data available for the given date range")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketDataError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("nothing to draw, the table is empty")]
    NoData,
    #[error("failed to render chart: {0}")]
    Render(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upload timed out")]
    Timeout,
    #[error("image host rejected credentials: {0}")]
    Auth(String),
    #[error("image host answered HTTP {0}")]
    Http(u16),
    #[error("no URL returned from image host")]
    EmptyResult,
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("network error: {0}")]
    Network(String),
    #[error("analysis request timed out")]
    Timeout,
    #[error("analysis service rejected credentials: {0}")]
    Auth(String),
    #[error("analysis service answered HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("analysis service returned no content")]
    EmptyResult,
}

impl AnalysisError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Fatal outcomes of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] MarketDataError),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
