use anyhow::Context;
use screener_core::domain::ticker::{parse_selection, Ticker};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct UniverseOptions {
    /// How many tickers from the top of the list file are screened.
    pub limit: usize,
}

impl Default for UniverseOptions {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("UNIVERSE_LIMIT") {
            if let Ok(n) = s.trim().parse::<usize>() {
                out.limit = n;
            }
        }

        out
    }
}

/// Tickers to screen: an explicit comma-separated selection wins, otherwise the first
/// `opts.limit` symbols from the list file.
pub fn select_universe(
    explicit: Option<&str>,
    tickers_file: &Path,
    opts: &UniverseOptions,
) -> anyhow::Result<Vec<Ticker>> {
    if let Some(raw) = explicit.filter(|s| !s.trim().is_empty()) {
        return parse_selection(raw).context("invalid --tickers selection");
    }

    anyhow::ensure!(opts.limit >= 1, "universe limit must be >= 1");

    let mut tickers = load_ticker_file(tickers_file)?;
    tickers.truncate(opts.limit);
    anyhow::ensure!(
        !tickers.is_empty(),
        "no tickers found in {}",
        tickers_file.display()
    );
    Ok(tickers)
}

pub fn load_ticker_file(path: &Path) -> anyhow::Result<Vec<Ticker>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open ticker list {}", path.display()))?;
    read_tickers(file).with_context(|| format!("failed to read ticker list {}", path.display()))
}

fn read_tickers<R: Read>(reader: R) -> anyhow::Result<Vec<Ticker>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let column = rdr
        .headers()?
        .iter()
        .position(|h| h.eq_ignore_ascii_case("ticker"))
        .unwrap_or(0);

    let mut out: Vec<Ticker> = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let Some(raw) = record.get(column).filter(|s| !s.is_empty()) else {
            continue;
        };
        match Ticker::parse(raw) {
            Ok(t) if !out.contains(&t) => out.push(t),
            Ok(_) => {}
            Err(err) => {
                // +2: one for the header, one for 1-based numbering.
                tracing::warn!(line = line + 2, value = raw, error = %err, "skipping invalid ticker");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn names(tickers: &[Ticker]) -> Vec<&str> {
        tickers.iter().map(|t| t.as_str()).collect()
    }

    #[test]
    fn finds_ticker_column_case_insensitively() {
        let csv = "Name,TICKER,Sector\nApple,aapl,Tech\nMicrosoft, msft ,Tech\n";
        let tickers = read_tickers(csv.as_bytes()).unwrap();
        assert_eq!(names(&tickers), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn falls_back_to_first_column() {
        let csv = "Symbol,Name\nNVDA,Nvidia\nAMD,AMD\n";
        let tickers = read_tickers(csv.as_bytes()).unwrap();
        assert_eq!(names(&tickers), vec!["NVDA", "AMD"]);
    }

    #[test]
    fn skips_blanks_and_duplicates_keeping_order() {
        let csv = "Ticker\nAAPL\n\n  \nmsft\nAAPL\nGOOG\n";
        let tickers = read_tickers(csv.as_bytes()).unwrap();
        assert_eq!(names(&tickers), vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn explicit_selection_overrides_file() {
        let tickers = select_universe(
            Some("tsla, aapl"),
            Path::new("does-not-exist.csv"),
            &UniverseOptions::default(),
        )
        .unwrap();
        assert_eq!(names(&tickers), vec!["TSLA", "AAPL"]);
    }

    #[test]
    fn file_selection_takes_first_n() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Ticker").unwrap();
        for t in ["A", "B", "C", "D"] {
            writeln!(file, "{t}").unwrap();
        }

        let tickers = select_universe(None, file.path(), &UniverseOptions { limit: 2 }).unwrap();
        assert_eq!(names(&tickers), vec!["A", "B"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(select_universe(None, Path::new("no/such/tickers.csv"), &UniverseOptions::default()).is_err());
    }
}
