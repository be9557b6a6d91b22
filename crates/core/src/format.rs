use crate::domain::record::DividendYield;
use crate::screen::aggregate::AggregatedRow;
use serde::Serialize;

pub const NOT_AVAILABLE: &str = "N/A";

/// `$X.XXT` / `$X.XXB` / `$X.XXM` at or above 1e12 / 1e9 / 1e6, otherwise whole dollars with
/// thousands separators. Halves round to even.
pub fn format_market_cap(market_cap: Option<f64>) -> String {
    let Some(v) = market_cap else {
        return NOT_AVAILABLE.to_string();
    };
    if v >= 1e12 {
        format!("${:.2}T", v / 1e12)
    } else if v >= 1e9 {
        format!("${:.2}B", v / 1e9)
    } else if v >= 1e6 {
        format!("${:.2}M", v / 1e6)
    } else {
        format!("${}", group_thousands(v.round_ties_even() as i64))
    }
}

pub fn format_dollars(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${v:.2}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_dividend_yield(dividend_yield: DividendYield) -> String {
    match dividend_yield {
        DividendYield::Unknown => NOT_AVAILABLE.to_string(),
        DividendYield::NoDividend => "0.00%".to_string(),
        DividendYield::Rate(r) => format!("{:.2}%", r * 100.0),
    }
}

pub fn format_ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_volume(volume: Option<u64>) -> String {
    match volume {
        Some(v) => group_thousands(v as i64),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// PE stays numeric so it can be compared against the filter threshold.
pub fn round_pe(pe: Option<f64>) -> Option<f64> {
    pe.filter(|v| v.is_finite()).map(|v| (v * 100.0).round() / 100.0)
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Display view of an [`AggregatedRow`]. Field names double as CSV headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Full Name")]
    pub full_name: String,
    #[serde(rename = "PE")]
    pub pe: Option<f64>,
    #[serde(rename = "Market Cap")]
    pub market_cap: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Buy")]
    pub buy: u32,
    #[serde(rename = "Hold")]
    pub hold: u32,
    #[serde(rename = "Sell")]
    pub sell: u32,
    #[serde(rename = "Upgrades")]
    pub upgrades: u32,
    #[serde(rename = "Downgrades")]
    pub downgrades: u32,
    #[serde(rename = "Volume")]
    pub volume: String,
    #[serde(rename = "Avg Volume")]
    pub avg_volume: String,
    #[serde(rename = "Dividend Yield")]
    pub dividend_yield: String,
    #[serde(rename = "Beta")]
    pub beta: String,
    #[serde(rename = "52W High")]
    pub fifty_two_week_high: String,
    #[serde(rename = "52W Low")]
    pub fifty_two_week_low: String,
    #[serde(rename = "Graham Value")]
    pub graham_value: String,
    #[serde(rename = "Data Sources")]
    pub data_sources: usize,
}

impl DisplayRow {
    pub const HEADERS: [&'static str; 19] = [
        "Ticker",
        "Name",
        "Full Name",
        "PE",
        "Market Cap",
        "Price",
        "Buy",
        "Hold",
        "Sell",
        "Upgrades",
        "Downgrades",
        "Volume",
        "Avg Volume",
        "Dividend Yield",
        "Beta",
        "52W High",
        "52W Low",
        "Graham Value",
        "Data Sources",
    ];

    pub fn from_row(row: &AggregatedRow) -> Self {
        let f = &row.fundamentals;
        let name = f.company_name.clone().unwrap_or_default();
        let full_name = f.long_name.clone().unwrap_or_else(|| name.clone());
        let r = row.recommendations;

        Self {
            ticker: row.ticker.to_string(),
            name,
            full_name,
            pe: round_pe(f.pe_ratio),
            market_cap: format_market_cap(f.market_cap),
            price: format_dollars(f.price),
            buy: r.buy,
            hold: r.hold,
            sell: r.sell,
            upgrades: r.upgrades,
            downgrades: r.downgrades,
            volume: format_volume(f.volume),
            avg_volume: format_volume(f.avg_volume),
            dividend_yield: format_dividend_yield(f.dividend_yield),
            beta: format_ratio(f.beta),
            fifty_two_week_high: format_dollars(f.fifty_two_week_high),
            fifty_two_week_low: format_dollars(f.fifty_two_week_low),
            graham_value: format_dollars(row.intrinsic_value),
            data_sources: row.source_count,
        }
    }

    /// Cells in [`Self::HEADERS`] order.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.ticker.clone(),
            self.name.clone(),
            self.full_name.clone(),
            format_ratio(self.pe),
            self.market_cap.clone(),
            self.price.clone(),
            self.buy.to_string(),
            self.hold.to_string(),
            self.sell.to_string(),
            self.upgrades.to_string(),
            self.downgrades.to_string(),
            self.volume.clone(),
            self.avg_volume.clone(),
            self.dividend_yield.clone(),
            self.beta.clone(),
            self.fifty_two_week_high.clone(),
            self.fifty_two_week_low.clone(),
            self.graham_value.clone(),
            self.data_sources.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenSummary {
    pub total: usize,
    pub avg_pe: Option<f64>,
}

pub fn summarize(rows: &[DisplayRow]) -> ScreenSummary {
    let pes: Vec<f64> = rows.iter().filter_map(|r| r.pe).collect();
    let avg_pe = if pes.is_empty() {
        None
    } else {
        round_pe(Some(pes.iter().sum::<f64>() / pes.len() as f64))
    };
    ScreenSummary {
        total: rows.len(),
        avg_pe,
    }
}
