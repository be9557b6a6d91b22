use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use screener_core::format::{DisplayRow, ScreenSummary};

pub fn render_results(rows: &[DisplayRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(DisplayRow::HEADERS.to_vec());
    for row in rows {
        table.add_row(row.cells());
    }
    table.to_string()
}

pub fn render_summary(summary: &ScreenSummary) -> String {
    let avg = summary
        .avg_pe
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "N/A".to_string());
    format!("Total Stocks: {}\nAvg P/E: {avg}", summary.total)
}
