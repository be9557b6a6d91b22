pub mod lock;
pub mod snapshot;

pub use lock::{try_acquire_snapshot_lock, SnapshotLock};
pub use snapshot::{load_snapshot, save_snapshot};
