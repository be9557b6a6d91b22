pub mod grade;
pub mod record;
pub mod snapshot;
pub mod ticker;
