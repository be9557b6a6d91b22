use anyhow::Context;
use screener_core::format::DisplayRow;
use screener_core::ingest::yahoo::PricePoint;
use std::io::Write;
use std::path::Path;

pub fn write_results_csv(path: &Path, rows: &[DisplayRow]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_rows(file, rows).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote results CSV");
    Ok(())
}

pub fn write_history_csv(path: &Path, points: &[PricePoint]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_rows(file, points).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), points = points.len(), "wrote price history CSV");
    Ok(())
}

fn write_rows<W: Write, T: serde::Serialize>(out: W, rows: &[T]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
