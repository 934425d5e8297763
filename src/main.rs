mod ai_analysis;
mod chart;
mod cli;
mod error;
mod image_host;
mod market_data;
mod pipeline;
mod report;
mod storage_utils;
mod wick_features;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::ai_analysis::OpenAiVisionClient;
use crate::chart::SvgCandlestickRenderer;
use crate::cli::Cli;
use crate::image_host::ImageKitClient;
use crate::market_data::{CsvFileSource, PriceHistorySource, YahooChartClient};
use crate::pipeline::WickPipeline;
use crate::report::render_table;
use crate::storage_utils::{AppConfig, AsyncStorageManager, Credentials};

async fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::from_file(path).await,
        None => {
            let storage = AsyncStorageManager::new_relative("storage").await?;
            storage.load_or_default("config").await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A missing .env is fine, keys may already be exported.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            error!(error = %e, "failed to read .env");
        }
    }

    let cli = Cli::parse();
    let request = cli.to_request()?;
    let config = load_config(&cli).await?;
    let credentials = Credentials::from_env();

    // Collaborators live for this run only.
    let source: Box<dyn PriceHistorySource> = match &cli.csv_path {
        Some(path) => Box::new(CsvFileSource::new(path)),
        None => Box::new(YahooChartClient::new(&config.market)?),
    };
    let renderer = SvgCandlestickRenderer::new(&config.chart);
    let image_host =
        ImageKitClient::new(config.image_host.clone(), credentials.imagekit_private_key)?;
    let analyst = OpenAiVisionClient::new(config.analysis.clone(), credentials.openai_api_key)?;
    let storage = AsyncStorageManager::new(&cli.output_dir).await?;

    let pipeline = WickPipeline {
        source: source.as_ref(),
        renderer: &renderer,
        image_host: &image_host,
        analyst: &analyst,
        storage: &storage,
    };

    match pipeline.run(&request).await {
        Ok(report) => {
            println!("\n{}\n", render_table(&report.table, &report.averages));
            info!("wick analysis complete");
            println!("{}", report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, ticker = %request.ticker, "wick analysis failed");
            Err(e.into())
        }
    }
}
