//! This module contains the core analysis pipeline logic.

use crate::ai_analysis::AnalysisService;
use crate::chart::{ChartRenderer, chart_file_name};
use crate::error::{MarketDataError, PipelineError};
use crate::image_host::ImageHost;
use crate::market_data::PriceHistorySource;
use crate::report::{Insights, WickCsvRow, WickReport, csv_file_name, data_summary};
use crate::storage_utils::AsyncStorageManager;
use crate::wick_features::compute_wick_features;
use chrono::NaiveDate;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub skip_analysis: bool,
}

/// Collaborators for a single run, borrowed from the caller.
pub struct WickPipeline<'a> {
    pub source: &'a dyn PriceHistorySource,
    pub renderer: &'a dyn ChartRenderer,
    pub image_host: &'a dyn ImageHost,
    pub analyst: &'a dyn AnalysisService,
    pub storage: &'a AsyncStorageManager,
}

impl WickPipeline<'_> {
    /// Runs the full wick analysis:
    /// 1. Fetches daily bars for the ticker and range.
    /// 2. Derives wick metrics and their averages.
    /// 3. Renders, uploads and analyzes the chart, degrading on failure.
    /// 4. Persists the per-day table.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<WickReport, PipelineError> {
        let ticker = request.ticker.as_str();

        // Step 1: Fetch Data
        info!(ticker, start = %request.start, end = %request.end, "fetching daily bars");
        let frame = self
            .source
            .fetch_daily(ticker, request.start, request.end)
            .await?;
        if frame.is_empty() {
            return Err(MarketDataError::Empty.into());
        }

        // Step 2: Derive Features
        let (table, averages) = compute_wick_features(&frame)?;
        let dropped = frame.len() - table.len();
        if dropped > 0 {
            warn!(dropped, "dropped incomplete rows");
        }
        info!(rows = table.len(), "wick features computed");
        let summary = data_summary(&averages);

        // Step 3: Chart
        let target = self.storage.path_for(&chart_file_name(ticker));
        let chart_path = match self.renderer.render(ticker, &table, &target) {
            Ok(path) => {
                info!(path = %path.display(), "chart saved");
                Some(path)
            }
            Err(e) => {
                // a failed draw may still leave a partial file on disk
                if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                    error!(
                        error = %e,
                        path = %target.display(),
                        "failed to render chart, keeping partial file"
                    );
                    Some(target)
                } else {
                    error!(error = %e, "failed to render chart");
                    None
                }
            }
        };

        // Step 4: Upload + Analysis
        let (chart_url, insights) = if request.skip_analysis {
            (None, Insights::Skipped("disabled by --skip-analysis".to_string()))
        } else {
            self.upload_and_analyze(chart_path.as_deref(), &summary).await
        };

        // Step 5: Persist
        let table_path = self
            .storage
            .save_csv(
                &csv_file_name(ticker),
                table.rows().iter().map(WickCsvRow::from),
            )
            .await?;
        info!(path = %table_path.display(), "wick table saved");

        Ok(WickReport {
            ticker: ticker.to_string(),
            start: request.start,
            end: request.end,
            averages,
            table,
            insights,
            chart_url,
            chart_path,
            table_path,
        })
    }

    async fn upload_and_analyze(
        &self,
        chart_path: Option<&std::path::Path>,
        summary: &str,
    ) -> (Option<String>, Insights) {
        let Some(path) = chart_path else {
            warn!("no chart file, skipping upload and analysis");
            return (None, Insights::Skipped("no chart file was rendered".to_string()));
        };

        info!(path = %path.display(), "uploading chart");
        let url = match self.image_host.upload(path).await {
            Ok(url) => {
                info!(%url, "chart uploaded");
                url
            }
            Err(e) => {
                error!(error = %e, "image upload failed, skipping analysis");
                return (None, Insights::Skipped(format!("image upload failed: {}", e)));
            }
        };

        info!("requesting chart analysis");
        let insights = match self.analyst.analyze(summary, &url).await {
            Ok(text) => {
                info!("analysis received");
                Insights::Generated(text)
            }
            Err(e) => {
                error!(error = %e, "analysis request failed");
                Insights::Failed(e.to_string())
            }
        };

        (Some(url), insights)
    }
}
