use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Dividend yield as reported by a provider. A reported zero is kept apart from "not reported".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rate", rename_all = "snake_case")]
pub enum DividendYield {
    #[default]
    Unknown,
    NoDividend,
    /// Fraction of price, e.g. 0.0123 for 1.23%.
    Rate(f64),
}

impl DividendYield {
    pub fn from_reported(value: Option<f64>) -> Self {
        match value {
            None => Self::Unknown,
            Some(v) if !v.is_finite() => Self::Unknown,
            Some(v) if v == 0.0 => Self::NoDividend,
            Some(v) => Self::Rate(v),
        }
    }
}

/// Scalar fields a provider may report. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub company_name: Option<String>,
    pub long_name: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub volume: Option<u64>,
    pub avg_volume: Option<u64>,
    pub dividend_yield: DividendYield,
    pub beta: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub eps: Option<f64>,
    pub book_value_per_share: Option<f64>,
}

impl Fundamentals {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Analyst recommendation tallies. Providers without recommendation data report zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationCounts {
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub upgrades: u32,
    pub downgrades: u32,
}

impl Add for RecommendationCounts {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for RecommendationCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.buy += rhs.buy;
        self.hold += rhs.hold;
        self.sell += rhs.sell;
        self.upgrades += rhs.upgrades;
        self.downgrades += rhs.downgrades;
    }
}

impl std::iter::Sum for RecommendationCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// One adapter's output for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub source: &'static str,
    pub fundamentals: Fundamentals,
    pub recommendations: RecommendationCounts,
}

impl SourceRecord {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            fundamentals: Fundamentals::default(),
            recommendations: RecommendationCounts::default(),
        }
    }
}
