use crate::domain::snapshot::{GradeCounts, RecommendationSnapshot};
use crate::domain::ticker::Ticker;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Current(RecommendationSnapshot),
    // Older files are a bare ticker map without a timestamp.
    Legacy(BTreeMap<Ticker, GradeCounts>),
}

/// Previous run's snapshot. `Ok(None)` when the file is missing or cannot be parsed; the
/// latter is logged and treated as an empty baseline.
pub fn load_snapshot(path: &Path) -> anyhow::Result<Option<RecommendationSnapshot>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read snapshot {}", path.display()))
        }
    };

    match serde_json::from_str::<StoredSnapshot>(&raw) {
        Ok(StoredSnapshot::Current(s)) => Ok(Some(s)),
        Ok(StoredSnapshot::Legacy(tickers)) => Ok(Some(RecommendationSnapshot::new(
            DateTime::<Utc>::default(),
            tickers,
        ))),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "snapshot file unreadable; starting from an empty baseline"
            );
            Ok(None)
        }
    }
}

/// Full overwrite: writes a temporary sibling, then renames it into place.
pub fn save_snapshot(path: &Path, snapshot: &RecommendationSnapshot) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(snapshot).context("failed to encode snapshot")?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);

    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into place at {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        tickers = snapshot.tickers.len(),
        "persisted recommendation snapshot"
    );
    Ok(())
}
