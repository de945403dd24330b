//! Partition consistency engine.
//!
//! A span owns a range over one value domain; its segments are ordered,
//! non-overlapping sub-ranges chained through `previous_segment_id`. Every
//! operation on [`SegmentEngine`] runs in one repository transaction, fires
//! lifecycle events around each stored mutation and leaves the chain links
//! consistent with the sort order.

pub mod boundary;
pub mod chain;
pub mod engine;
pub mod memory;
pub mod notifier;
pub mod registry;
pub mod repair;
pub mod repository;
mod segment_ops;
mod span_ops;
pub mod validate;

pub use boundary::{Boundary, BoundaryMove, Extent};
pub use chain::{Placement, SegmentChain};
pub use engine::SegmentEngine;
pub use memory::{MemoryRepository, MemoryTransaction};
pub use notifier::{Mutation, Notifier, RecordingNotifier, SignalScope, TracingNotifier};
pub use registry::{
    ConfigProvider, ModelRegistry, RegistryDescription, SegmentConfig, SegmentModel, SpanConfig,
    SpanModel,
};
pub use repair::RepairOutcome;
pub use repository::{Repository, Transaction};
