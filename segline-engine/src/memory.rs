use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use segline_core::errors::{Result, SegmentError};
use segline_protocol::query::{sort_segments, SegmentQuery};
use segline_protocol::segment::Segment;
use segline_protocol::span::Span;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::repository::{Repository, Transaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    spans: HashMap<Uuid, Span>,
    segments: HashMap<Uuid, Segment>,
}

impl Tables {
    /// Storage-level backstop: active segments of one span never overlap.
    fn check_no_overlap(&self) -> Result<()> {
        let mut by_span: HashMap<Uuid, Vec<Segment>> = HashMap::new();
        for segment in self.segments.values().filter(|s| s.is_active()) {
            by_span
                .entry(segment.span_id)
                .or_default()
                .push(segment.clone());
        }

        for segments in by_span.values_mut() {
            sort_segments(segments);
            for pair in segments.windows(2) {
                if pair[0].segment_range.overlaps(&pair[1].segment_range) {
                    return Err(SegmentError::Overlap {
                        proposed: pair[1].segment_range.to_string(),
                        existing: pair[0].segment_range.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Process-local repository. Transactions are serialized and work on a copy
/// of the tables that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed span row, deleted or not.
    pub async fn span_row(&self, id: Uuid) -> Option<Span> {
        self.tables.lock().await.spans.get(&id).cloned()
    }

    /// Every committed segment row of the span, including soft-deleted ones.
    pub async fn segment_rows(&self, span_id: Uuid) -> Vec<Segment> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Segment> = tables
            .segments
            .values()
            .filter(|s| s.span_id == span_id)
            .cloned()
            .collect();
        sort_segments(&mut rows);
        rows
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_span(&mut self, span: &Span) -> Result<()> {
        if self.working.spans.contains_key(&span.id) {
            return Err(SegmentError::Storage(format!("duplicate span id {}", span.id)));
        }
        self.working.spans.insert(span.id, span.clone());
        Ok(())
    }

    async fn update_span(&mut self, span: &Span) -> Result<()> {
        let row = self
            .working
            .spans
            .get_mut(&span.id)
            .ok_or_else(|| SegmentError::SpanNotFound(span.id.to_string()))?;
        *row = span.clone();
        Ok(())
    }

    async fn delete_span(&mut self, id: Uuid) -> Result<()> {
        self.working
            .spans
            .remove(&id)
            .ok_or_else(|| SegmentError::SpanNotFound(id.to_string()))?;
        self.working.segments.retain(|_, segment| segment.span_id != id);
        Ok(())
    }

    async fn fetch_span(&mut self, id: Uuid) -> Result<Span> {
        self.working
            .spans
            .get(&id)
            .cloned()
            .ok_or_else(|| SegmentError::SpanNotFound(id.to_string()))
    }

    async fn insert_segment(&mut self, segment: &Segment) -> Result<()> {
        if !self.working.spans.contains_key(&segment.span_id) {
            return Err(SegmentError::SpanNotFound(segment.span_id.to_string()));
        }
        if self.working.segments.contains_key(&segment.id) {
            return Err(SegmentError::Storage(format!(
                "duplicate segment id {}",
                segment.id
            )));
        }
        self.working.segments.insert(segment.id, segment.clone());
        Ok(())
    }

    async fn update_segment(&mut self, segment: &Segment) -> Result<()> {
        let row = self
            .working
            .segments
            .get_mut(&segment.id)
            .ok_or_else(|| SegmentError::SegmentNotFound(segment.id.to_string()))?;
        *row = segment.clone();
        Ok(())
    }

    async fn delete_segment(&mut self, id: Uuid) -> Result<()> {
        self.working
            .segments
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SegmentError::SegmentNotFound(id.to_string()))
    }

    async fn fetch_segment(&mut self, id: Uuid) -> Result<Segment> {
        self.working
            .segments
            .get(&id)
            .cloned()
            .ok_or_else(|| SegmentError::SegmentNotFound(id.to_string()))
    }

    async fn query_segments(&mut self, query: SegmentQuery) -> Result<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .working
            .segments
            .values()
            .filter(|segment| query.matches(segment))
            .cloned()
            .collect();
        sort_segments(&mut segments);
        Ok(segments)
    }

    async fn commit(self) -> Result<()> {
        self.working.check_no_overlap()?;
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
