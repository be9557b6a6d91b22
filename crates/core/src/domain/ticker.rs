use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange symbol, stored trimmed and uppercased. Not checked against any exchange list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let s = raw.trim().to_ascii_uppercase();
        anyhow::ensure!(!s.is_empty(), "ticker must be non-empty");
        anyhow::ensure!(
            !s.chars().any(|c| c.is_whitespace() || c == ','),
            "ticker must not contain whitespace or commas: {raw:?}"
        );
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

/// Parses a comma-separated selection ("aapl, msft,,AAPL") into unique tickers, first occurrence wins.
pub fn parse_selection(raw: &str) -> anyhow::Result<Vec<Ticker>> {
    let mut out: Vec<Ticker> = Vec::new();
    for part in raw.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let ticker = Ticker::parse(part)?;
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_uppercases() {
        let t = Ticker::parse("  brk.b ").unwrap();
        assert_eq!(t.as_str(), "BRK.B");
    }

    #[test]
    fn parse_rejects_empty_and_embedded_space() {
        assert!(Ticker::parse("   ").is_err());
        assert!(Ticker::parse("AA PL").is_err());
    }

    #[test]
    fn selection_skips_blanks_and_dedupes() {
        let out = parse_selection("aapl, msft,,AAPL ,nvda").unwrap();
        let names: Vec<&str> = out.iter().map(Ticker::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn deserializes_through_parse() {
        let t: Ticker = serde_json::from_str("\"msft\"").unwrap();
        assert_eq!(t.as_str(), "MSFT");
        assert!(serde_json::from_str::<Ticker>("\"\"").is_err());
    }
}
