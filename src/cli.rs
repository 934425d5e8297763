use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::Parser;
use regex::Regex;

use crate::pipeline::AnalysisRequest;

#[derive(Parser, Debug)]
#[command(
    name = "candle-wick-analyzer",
    about = "Daily candle wick statistics with a charted AI commentary"
)]
pub struct Cli {
    /// Stock ticker, e.g. INTU
    pub ticker: String,

    /// First trading day to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Day after the last trading day to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Read OHLCV bars from a local CSV file instead of Yahoo Finance
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: Option<PathBuf>,

    /// Directory receiving the chart and the wick table
    #[arg(long = "output-dir", default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Config file; defaults to storage/config.json next to the binary
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Render the chart locally but do not upload it or call the analysis service
    #[arg(long = "skip-analysis", default_value_t = false)]
    pub skip_analysis: bool,
}

pub fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_uppercase();
    let pattern = Regex::new(r"^\^?[A-Z0-9][A-Z0-9.=-]{0,14}$")?;
    if !pattern.is_match(&ticker) {
        bail!("invalid ticker symbol {:?}", raw);
    }
    Ok(ticker)
}

impl Cli {
    pub fn to_request(&self) -> Result<AnalysisRequest> {
        if self.start >= self.end {
            bail!(
                "start date {} must be before end date {}",
                self.start,
                self.end
            );
        }
        Ok(AnalysisRequest {
            ticker: normalize_ticker(&self.ticker)?,
            start: self.start,
            end: self.end,
            skip_analysis: self.skip_analysis,
        })
    }
}
