use crate::wick_features::{WickAverages, WickRow, WickTable};
use chrono::NaiveDate;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

const RECENT_ROWS: usize = 15;

/// One line of the persisted per-day table.
#[derive(Serialize, Debug)]
pub struct WickCsvRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Upper_Wick")]
    pub upper_wick: f64,
    #[serde(rename = "Lower_Wick")]
    pub lower_wick: f64,
    #[serde(rename = "Body_Size")]
    pub body_size: f64,
    #[serde(rename = "Total_Candle")]
    pub total_candle: f64,
    #[serde(rename = "Wick_Score")]
    pub wick_score: f64,
}

impl From<&WickRow> for WickCsvRow {
    fn from(row: &WickRow) -> Self {
        Self {
            date: row.date,
            upper_wick: row.metrics.upper_wick,
            lower_wick: row.metrics.lower_wick,
            body_size: row.metrics.body_size,
            total_candle: row.metrics.total_range,
            wick_score: row.metrics.wick_score,
        }
    }
}

pub fn csv_file_name(ticker: &str) -> String {
    format!("{}_wick_analysis.csv", ticker)
}

pub fn data_summary(averages: &WickAverages) -> String {
    format!(
        "Average Upper Wick: {:.2}\n\
         Average Lower Wick: {:.2}\n\
         Average Body Size: {:.2}\n\
         Average Total Candle: {:.2}\n\
         Average Wick Score: {:.2}",
        averages.upper_wick,
        averages.lower_wick,
        averages.body_size,
        averages.total_range,
        averages.wick_score,
    )
}

/// What became of the remote analysis step.
#[derive(Debug, Clone, PartialEq)]
pub enum Insights {
    Generated(String),
    Failed(String),
    Skipped(String),
}

impl fmt::Display for Insights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insights::Generated(text) => f.write_str(text),
            Insights::Failed(reason) => write!(f, "Error generating analysis: {}", reason),
            Insights::Skipped(reason) => write!(f, "Analysis skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WickReport {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub averages: WickAverages,
    pub table: WickTable,
    pub insights: Insights,
    pub chart_url: Option<String>,
    pub chart_path: Option<PathBuf>,
    pub table_path: PathBuf,
}

impl fmt::Display for WickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Wick Analysis Report for {} ({} to {})",
            self.ticker, self.start, self.end
        )?;
        writeln!(f, "{}", "-".repeat(62))?;
        writeln!(f, "{}", data_summary(&self.averages))?;
        writeln!(f)?;
        writeln!(f, "AI-Generated Insights:")?;
        writeln!(f, "{}", self.insights)?;
        writeln!(f)?;
        writeln!(
            f,
            "Chart URL: {}",
            self.chart_url.as_deref().unwrap_or("unavailable")
        )?;
        if let Some(path) = &self.chart_path {
            writeln!(f, "Chart file: {}", path.display())?;
        }
        writeln!(f)?;
        let file_name = self
            .table_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.table_path.display().to_string());
        write!(
            f,
            "A detailed wick analysis table has been saved as '{}'.",
            file_name
        )
    }
}

// --- Terminal Table ---

fn num_cell(value: f64) -> Cell {
    Cell::new(format!("{:.2}", value)).set_alignment(CellAlignment::Right)
}

/// Recent days plus a bold averages footer.
pub fn render_table(table: &WickTable, averages: &WickAverages) -> Table {
    let mut out = Table::new();
    out.load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Date", "Upper Wick", "Lower Wick", "Body", "Range", "Wick Score", "Volume"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    let skip = table.len().saturating_sub(RECENT_ROWS);
    for row in table.rows().iter().skip(skip) {
        let color = if row.candle.close >= row.candle.open {
            Color::Green
        } else {
            Color::Red
        };
        let m = row.metrics;
        out.add_row(vec![
            Cell::new(row.date).fg(color),
            num_cell(m.upper_wick),
            num_cell(m.lower_wick),
            num_cell(m.body_size),
            num_cell(m.total_range),
            num_cell(m.wick_score),
            Cell::new(format!("{:.0}", row.candle.volume)).set_alignment(CellAlignment::Right),
        ]);
    }

    out.add_row(
        [
            averages.upper_wick,
            averages.lower_wick,
            averages.body_size,
            averages.total_range,
            averages.wick_score,
        ]
        .into_iter()
        .fold(
            vec![Cell::new("Average").add_attribute(Attribute::Bold)],
            |mut cells, v| {
                cells.push(num_cell(v).add_attribute(Attribute::Bold));
                cells
            },
        ),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wick_features::{PriceField, PriceFrame, compute_wick_features};

    fn sample() -> (WickTable, WickAverages) {
        let dates = (1..=20)
            .map(|d| NaiveDate::from_ymd_opt(2024, 11, d).unwrap())
            .collect();
        let frame = PriceFrame::new(dates)
            .with_column(PriceField::Open, vec![Some(10.0); 20])
            .with_column(PriceField::High, vec![Some(12.0); 20])
            .with_column(PriceField::Low, vec![Some(8.0); 20])
            .with_column(PriceField::Close, vec![Some(11.0); 20])
            .with_column(PriceField::Volume, vec![Some(1.0); 20]);
        compute_wick_features(&frame).unwrap()
    }

    fn report(insights: Insights, chart_url: Option<&str>) -> WickReport {
        WickReport {
            ticker: "INTU".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 10, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 2, 6).unwrap(),
            averages: WickAverages {
                upper_wick: 1.0,
                lower_wick: 2.5,
                body_size: 1.456,
                total_range: 4.954,
                wick_score: 3.5,
            },
            table: WickTable::default(),
            insights,
            chart_url: chart_url.map(str::to_string),
            chart_path: None,
            table_path: PathBuf::from("out/INTU_wick_analysis.csv"),
        }
    }

    #[test]
    fn summary_uses_two_decimals() {
        let summary = data_summary(&report(Insights::Generated(String::new()), None).averages);
        assert_eq!(
            summary,
            "Average Upper Wick: 1.00\n\
             Average Lower Wick: 2.50\n\
             Average Body Size: 1.46\n\
             Average Total Candle: 4.95\n\
             Average Wick Score: 3.50"
        );
    }

    #[test]
    fn report_contains_all_sections() {
        let text = report(
            Insights::Generated("Buyers defend the lows.".to_string()),
            Some("https://ik.imagekit.io/demo/INTU.svg"),
        )
        .to_string();

        assert!(text.starts_with("Wick Analysis Report for INTU (2024-10-15 to 2025-02-06)\n"));
        assert!(text.contains("Average Wick Score: 3.50"));
        assert!(text.contains("AI-Generated Insights:\nBuyers defend the lows."));
        assert!(text.contains("Chart URL: https://ik.imagekit.io/demo/INTU.svg"));
        assert!(text.ends_with("saved as 'INTU_wick_analysis.csv'."));
    }

    #[test]
    fn degraded_report_explains_missing_parts() {
        let text = report(Insights::Skipped("image upload failed".to_string()), None).to_string();
        assert!(text.contains("Analysis skipped: image upload failed"));
        assert!(text.contains("Chart URL: unavailable"));
    }

    #[test]
    fn csv_row_maps_metrics() {
        let (table, _) = sample();
        let row = WickCsvRow::from(&table.rows()[0]);
        assert_eq!(row.upper_wick, 1.0);
        assert_eq!(row.lower_wick, 2.0);
        assert_eq!(row.body_size, 1.0);
        assert_eq!(row.total_candle, 4.0);
        assert_eq!(row.wick_score, 3.0);
        assert_eq!(csv_file_name("INTU"), "INTU_wick_analysis.csv");
    }

    #[test]
    fn terminal_table_shows_recent_days_and_average() {
        let (table, averages) = sample();
        let rendered = render_table(&table, &averages).to_string();
        assert!(rendered.contains("2024-11-20"));
        assert!(!rendered.contains("2024-11-05"));
        assert!(rendered.contains("Average"));
        assert!(rendered.contains("Wick Score"));
    }
}
