//! Shared vocabulary of the Segline crates: range values, the span and
//! segment entities, lifecycle events and segment queries.

pub mod event;
pub mod query;
pub mod range;
pub mod segment;
pub mod span;

pub mod prelude {
    pub use crate::event::{EntityKind, EventPayload, LifecycleEvent, Stage};
    pub use crate::query::{sort_segments, SegmentQuery, SegmentStatus};
    pub use crate::range::{BoundValue, DeltaKind, DeltaValue, RangeValue, RangeValueKind, ScalarKind};
    pub use crate::segment::{Segment, SegmentBuilder};
    pub use crate::span::{Span, SpanBuilder};
}
