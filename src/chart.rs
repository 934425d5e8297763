use crate::error::ChartError;
use crate::storage_utils::ChartConfig;
use crate::wick_features::WickTable;
use chrono::{Days, NaiveDate};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

pub trait ChartRenderer: Send + Sync {
    /// Draws `table` into `path` and returns the written path.
    fn render(&self, ticker: &str, table: &WickTable, path: &Path) -> Result<PathBuf, ChartError>;
}

pub fn chart_file_name(ticker: &str) -> String {
    format!("{}_candlestick_chart.svg", ticker)
}

pub struct SvgCandlestickRenderer {
    width: u32,
    height: u32,
}

impl SvgCandlestickRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }
}

fn render_err<E: std::fmt::Display>(err: E) -> ChartError {
    ChartError::Render(err.to_string())
}

impl ChartRenderer for SvgCandlestickRenderer {
    fn render(&self, ticker: &str, table: &WickTable, path: &Path) -> Result<PathBuf, ChartError> {
        let (first, last) = match (table.rows().first(), table.rows().last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => return Err(ChartError::NoData),
        };

        let (low, high) = table
            .rows()
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), row| {
                (lo.min(row.candle.low), hi.max(row.candle.high))
            });
        if !low.is_finite() || !high.is_finite() {
            return Err(ChartError::Render("price range is not finite".to_string()));
        }
        // keep flat series drawable
        let pad = ((high - low) * 0.05).max(high.abs() * 0.01).max(0.01);

        let x_start = first.checked_sub_days(Days::new(1)).unwrap_or(first);
        let x_end = last.checked_add_days(Days::new(1)).unwrap_or(last);
        // roughly 60% of the per-day slot, never below one pixel
        let slot = self.width / (table.len() as u32 + 2).max(1);
        let candle_width = (slot * 3 / 5).max(1);

        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} Candlestick Chart", ticker), ("sans-serif", 28))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(x_start..x_end, (low - pad)..(high + pad))
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Price")
            .x_labels(10)
            .x_label_formatter(&|d: &NaiveDate| d.format("%Y-%m-%d").to_string())
            .y_label_formatter(&|p: &f64| format!("{:.2}", p))
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(table.rows().iter().map(|row| {
                CandleStick::new(
                    row.date,
                    row.candle.open,
                    row.candle.high,
                    row.candle.low,
                    row.candle.close,
                    GREEN.mix(0.5).filled(),
                    RED.mix(0.5).filled(),
                    candle_width,
                )
            }))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wick_features::{PriceField, PriceFrame, augment};
    use tempfile::tempdir;

    fn sample_table() -> WickTable {
        let dates = (15..=18)
            .map(|d| NaiveDate::from_ymd_opt(2024, 10, d).unwrap())
            .collect();
        let frame = PriceFrame::new(dates)
            .with_column(PriceField::Open, vec![Some(10.0), Some(11.0), Some(12.0), Some(11.5)])
            .with_column(PriceField::High, vec![Some(12.0), Some(12.5), Some(13.0), Some(12.0)])
            .with_column(PriceField::Low, vec![Some(9.0), Some(10.5), Some(11.0), Some(10.0)])
            .with_column(PriceField::Close, vec![Some(11.0), Some(12.0), Some(11.5), Some(10.5)])
            .with_column(PriceField::Volume, vec![Some(100.0); 4]);
        augment(&frame).unwrap()
    }

    #[test]
    fn renders_svg_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(chart_file_name("INTU"));
        let renderer = SvgCandlestickRenderer::new(&ChartConfig::default());

        let written = renderer.render("INTU", &sample_table(), &path).unwrap();

        assert_eq!(written, path);
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("INTU Candlestick Chart"));
    }

    #[test]
    fn empty_table_is_no_data() {
        let dir = tempdir().unwrap();
        let renderer = SvgCandlestickRenderer::new(&ChartConfig::default());
        let err = renderer
            .render("INTU", &WickTable::default(), &dir.path().join("x.svg"))
            .unwrap_err();
        assert!(matches!(err, ChartError::NoData));
    }

    #[test]
    fn chart_file_name_uses_ticker() {
        assert_eq!(chart_file_name("INTU"), "INTU_candlestick_chart.svg");
    }
}
