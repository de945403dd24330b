use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::segment::Segment;

/// Which segments of a span a query returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    #[default]
    Active,
    Inactive,
    All,
}

/// Segment filter understood by every repository.
///
/// Results are always ordered by lower bound, then upper bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentQuery {
    pub span_id: Uuid,
    #[serde(default)]
    pub status: SegmentStatus,
}

impl SegmentQuery {
    pub fn active(span_id: Uuid) -> Self {
        Self {
            span_id,
            status: SegmentStatus::Active,
        }
    }

    pub fn inactive(span_id: Uuid) -> Self {
        Self {
            span_id,
            status: SegmentStatus::Inactive,
        }
    }

    pub fn all(span_id: Uuid) -> Self {
        Self {
            span_id,
            status: SegmentStatus::All,
        }
    }

    pub fn matches(&self, segment: &Segment) -> bool {
        if segment.span_id != self.span_id {
            return false;
        }
        match self.status {
            SegmentStatus::Active => segment.is_active(),
            SegmentStatus::Inactive => segment.is_deleted(),
            SegmentStatus::All => true,
        }
    }
}

/// Sorts segments into chain order: lower bound, upper bound, then id.
pub fn sort_segments(segments: &mut [Segment]) {
    segments.sort_by(|a, b| {
        a.lower()
            .cmp(&b.lower())
            .then_with(|| a.upper().cmp(&b.upper()))
            .then_with(|| a.id.cmp(&b.id))
    });
}
