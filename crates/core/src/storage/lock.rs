use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::env_parse;

// A lock file older than this is assumed to belong to a crashed run and is taken over.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

pub fn lock_path_for(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive guard over the snapshot read-modify-write. Dropping it releases the lock.
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
    released: bool,
}

impl SnapshotLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> anyhow::Result<()> {
        self.released = true;
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to release snapshot lock {}", self.path.display()))
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// `Ok(None)` when another run holds the lock.
pub fn try_acquire_snapshot_lock(snapshot_path: &Path) -> anyhow::Result<Option<SnapshotLock>> {
    let stale_after = env_parse::<u64>("SNAPSHOT_LOCK_STALE_SECS")
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_STALE_AFTER);
    try_acquire_with(snapshot_path, stale_after)
}

fn try_acquire_with(
    snapshot_path: &Path,
    stale_after: Duration,
) -> anyhow::Result<Option<SnapshotLock>> {
    let path = lock_path_for(snapshot_path);

    if create_lock_file(&path)? {
        return Ok(Some(SnapshotLock {
            path,
            released: false,
        }));
    }

    if !is_stale(&path, stale_after) {
        return Ok(None);
    }

    tracing::warn!(lock = %path.display(), "taking over stale snapshot lock");
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to remove stale lock {}", path.display()))
        }
    }

    // Another run may have won the race after the removal.
    Ok(create_lock_file(&path)?.then(|| SnapshotLock {
        path,
        released: false,
    }))
}

fn create_lock_file(path: &Path) -> anyhow::Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut f) => {
            let _ = writeln!(f, "{}", std::process::id());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to create lock file {}", path.display())),
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
