use segline_core::errors::Result;
use segline_protocol::query::{sort_segments, SegmentQuery};
use segline_protocol::range::RangeValue;
use segline_protocol::segment::Segment;
use serde::Serialize;
use uuid::Uuid;

use crate::repository::Transaction;

/// Active segments of one span in sort order.
///
/// Neighbours are derived from the sort order, never from the cached
/// `previous_segment_id` links.
#[derive(Debug, Clone, Default)]
pub struct SegmentChain {
    segments: Vec<Segment>,
}

/// Where a segment sits in its span's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    /// `None` for segments that are not active.
    pub position: Option<usize>,
    pub count: usize,
}

impl Placement {
    pub fn is_active(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_first(&self) -> bool {
        self.position == Some(0)
    }

    pub fn is_last(&self) -> bool {
        matches!(self.position, Some(p) if p + 1 == self.count)
    }

    pub fn is_first_and_last(&self) -> bool {
        self.is_first() && self.is_last()
    }

    pub fn is_first_or_last(&self) -> bool {
        self.is_first() || self.is_last()
    }

    pub fn is_internal(&self) -> bool {
        self.is_active() && !self.is_first_or_last()
    }
}

impl SegmentChain {
    /// Builds a chain from arbitrary segments, keeping the active ones.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut segments: Vec<Segment> = segments.into_iter().filter(|s| s.is_active()).collect();
        sort_segments(&mut segments);
        Self { segments }
    }

    pub async fn load<T: Transaction + ?Sized>(tx: &mut T, span_id: Uuid) -> Result<Self> {
        let segments = tx.query_segments(SegmentQuery::active(span_id)).await?;
        Ok(Self::new(segments))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn previous(&self, id: Uuid) -> Option<&Segment> {
        let position = self.position(id)?;
        position.checked_sub(1).and_then(|p| self.segments.get(p))
    }

    pub fn next(&self, id: Uuid) -> Option<&Segment> {
        let position = self.position(id)?;
        self.segments.get(position + 1)
    }

    /// Earliest active segment.
    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    /// Latest active segment.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn placement(&self, id: Uuid) -> Placement {
        Placement {
            position: self.position(id),
            count: self.segments.len(),
        }
    }

    /// Active segments overlapping `range`, in order.
    pub fn overlapping(&self, range: &RangeValue) -> Vec<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.segment_range.overlaps(range))
            .collect()
    }
}
