//! Segline: ordered interval partitions over integer, decimal, date and
//! timestamp domains.
//!
//! A span owns a half-open range; its segments partition that range into
//! ordered, non-overlapping sub-ranges. The engine keeps containment,
//! no-overlap and gap policies intact across creates, shifts, splits,
//! merges and deletes, and repairs the cached `previous_segment_id`
//! links after every mutation.
//!
//! The workspace is split into:
//!
//! * [`segline_core`]: error type, settings, logging and the database pool
//! * [`segline_protocol`]: range values, entities, lifecycle events and queries
//! * [`segline_engine`]: the operations, model registry, notifier and repository seam
//! * `segline_store` (feature `postgres`): the PostgreSQL repository

pub use segline_core;
pub use segline_engine;
pub use segline_protocol;
#[cfg(feature = "postgres")]
pub use segline_store;

pub use segline_core::errors::{Result, SegmentError};
pub use segline_core::logging::{init_tracing, init_tracing_for};
pub use segline_core::{PreviousOnDelete, SegmentSettings};
pub use segline_engine::{
    Boundary, BoundaryMove, ConfigProvider, Extent, MemoryRepository, ModelRegistry, Notifier,
    Placement, RecordingNotifier, RepairOutcome, Repository, SegmentChain, SegmentEngine,
    SegmentModel, SpanModel, TracingNotifier, Transaction,
};

pub mod prelude {
    pub use segline_protocol::prelude::*;

    pub use crate::{
        Boundary, BoundaryMove, Extent, MemoryRepository, ModelRegistry, PreviousOnDelete,
        RepairOutcome, Result, SegmentEngine, SegmentError, SegmentModel, SegmentSettings,
        SpanModel,
    };
}
