//! PostgreSQL storage for Segline spans and segments.
//!
//! Ranges live in native range columns so the database itself rejects
//! overlapping active segments of a span (deferred exclusion constraints
//! backed by `btree_gist`).

pub mod ranges;
pub mod repository;

pub use ranges::RangeColumns;
pub use repository::{PgRepository, PgTransaction, SeglineMigrator};
