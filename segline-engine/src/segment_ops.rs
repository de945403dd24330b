use segline_core::errors::{Result, SegmentError};
use segline_protocol::event::{EntityKind, EventPayload};
use segline_protocol::range::{BoundValue, DeltaValue, RangeValue};
use segline_protocol::segment::{Segment, SegmentBuilder};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::boundary::{self, Boundary, BoundaryMove, Extent};
use crate::chain::SegmentChain;
use crate::engine::{settle, SegmentEngine};
use crate::notifier::{Mutation, Notifier, SignalScope};
use crate::repair;
use crate::repository::{Repository, Transaction};

impl<R, N> SegmentEngine<R, N>
where
    R: Repository,
    N: Notifier,
{
    /// Creates a segment, growing the span to cover it.
    ///
    /// When segment gaps are disallowed the segments sorted directly before
    /// and after the new one are stretched to touch it.
    pub async fn create_segment(
        &self,
        span_id: Uuid,
        range: RangeValue,
        fields: Map<String, Value>,
    ) -> Result<Segment> {
        info!(%span_id, %range, "creating segment");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self.create_segment_in(&mut tx, span_id, range, fields, None).await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    pub(crate) async fn create_segment_in(
        &self,
        tx: &mut R::Tx,
        span_id: Uuid,
        range: RangeValue,
        fields: Map<String, Value>,
        previous: Option<Uuid>,
    ) -> Result<Segment> {
        let span = tx.fetch_span(span_id).await?;
        let config = self.span_config_for(&span)?;
        if range.kind() != span.current_range.kind() {
            return Err(SegmentError::type_mismatch(span.current_range.kind(), range.kind()));
        }

        let chain = SegmentChain::load(&mut *tx, span_id).await?;
        let overlapping = chain.overlapping(&range);
        if !overlapping.is_empty() {
            let existing: Vec<String> = overlapping
                .iter()
                .map(|s| s.segment_range.to_string())
                .collect();
            return Err(SegmentError::Overlap {
                proposed: range.to_string(),
                existing: existing.join(", "),
            });
        }

        let segment = SegmentBuilder::new(span_id, range)
            .previous(previous)
            .fields(fields)
            .build();
        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Segment,
            Mutation::Create,
            EventPayload::ProposedSegment { span_id, range },
        );
        let result: Result<Segment> = async {
            let span = if span.current_range.contains_range(&range) {
                span
            } else {
                self.extend_span_in(tx, span_id, Extent::Range(range)).await?
            };
            if !span.current_range.contains_range(&range) {
                return Err(SegmentError::OutOfSpanRange {
                    range: range.to_string(),
                    span_range: span.current_range.to_string(),
                });
            }
            tx.insert_segment(&segment).await?;
            Ok(segment)
        }
        .await;
        let segment = scope.finish(result, |s| EventPayload::Segment(s.clone()))?;

        repair::check_and_fix_relationships(&mut *tx, &self.notifier, span_id).await?;

        if !config.allow_segment_gaps {
            let chain = SegmentChain::load(&mut *tx, span_id).await?;
            let previous = chain.previous(segment.id).cloned();
            let next = chain.next(segment.id).cloned();
            if let Some(mut previous) = previous.filter(|p| p.upper() != segment.lower()) {
                debug!(segment_id = %previous.id, to = %segment.lower(), "closing gap below new segment");
                previous.segment_range =
                    boundary::set_boundary(&previous.segment_range, segment.lower(), Boundary::Upper)?;
                self.save_segment(tx, previous).await?;
            }
            if let Some(mut next) = next.filter(|n| n.lower() != segment.upper()) {
                debug!(segment_id = %next.id, to = %segment.upper(), "closing gap above new segment");
                next.segment_range =
                    boundary::set_boundary(&next.segment_range, segment.upper(), Boundary::Lower)?;
                self.save_segment(tx, next).await?;
            }
        }

        tx.fetch_segment(segment.id).await
    }

    /// Creates a segment that must already lie within the span's range.
    pub async fn insert_segment(
        &self,
        span_id: Uuid,
        range: RangeValue,
        fields: Map<String, Value>,
    ) -> Result<Segment> {
        info!(%span_id, %range, "inserting segment");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self.insert_segment_in(&mut tx, span_id, range, fields).await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    async fn insert_segment_in(
        &self,
        tx: &mut R::Tx,
        span_id: Uuid,
        range: RangeValue,
        fields: Map<String, Value>,
    ) -> Result<Segment> {
        let span = tx.fetch_span(span_id).await?;
        if !span.current_range.contains_range(&range) {
            return Err(SegmentError::OutOfSpanRange {
                range: range.to_string(),
                span_range: span.current_range.to_string(),
            });
        }
        self.create_segment_in(tx, span_id, range, fields, None).await
    }

    /// Moves both bounds of a segment, growing the span if it leaves it.
    pub async fn shift_segment(&self, segment_id: Uuid, delta: impl Into<DeltaValue>) -> Result<Segment> {
        let delta = delta.into();
        info!(%segment_id, %delta, "shifting segment");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span_id = tx.fetch_segment(segment_id).await?.span_id;
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self.shift_segment_in(&mut tx, segment_id, delta).await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    async fn shift_segment_in(&self, tx: &mut R::Tx, segment_id: Uuid, delta: DeltaValue) -> Result<Segment> {
        let mut segment = self.active_segment(tx, segment_id).await?;
        segment.segment_range = boundary::shift(&segment.segment_range, &delta)?;
        self.store_moved_segment(tx, segment).await
    }

    /// Moves one bound of a segment, growing the span if the bound leaves it.
    pub async fn shift_segment_boundary(
        &self,
        segment_id: Uuid,
        which: Boundary,
        movement: BoundaryMove,
    ) -> Result<Segment> {
        info!(%segment_id, %which, ?movement, "shifting segment boundary");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span_id = tx.fetch_segment(segment_id).await?.span_id;
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self
                .shift_segment_boundary_in(&mut tx, segment_id, which, movement)
                .await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    async fn shift_segment_boundary_in(
        &self,
        tx: &mut R::Tx,
        segment_id: Uuid,
        which: Boundary,
        movement: BoundaryMove,
    ) -> Result<Segment> {
        let mut segment = self.active_segment(tx, segment_id).await?;
        let value = boundary::resolve_move(&segment.segment_range, which, &movement)?;
        boundary::ensure_not_crossing(&segment.segment_range, which, &value)?;
        segment.segment_range = boundary::set_boundary(&segment.segment_range, value, which)?;
        self.store_moved_segment(tx, segment).await
    }

    async fn active_segment(&self, tx: &mut R::Tx, segment_id: Uuid) -> Result<Segment> {
        let segment = tx.fetch_segment(segment_id).await?;
        if segment.is_deleted() {
            return Err(SegmentError::InvalidArgument(format!(
                "segment {} is deleted",
                segment_id
            )));
        }
        Ok(segment)
    }

    /// Saves a segment whose range changed: rejects overlaps, grows the span
    /// to contain it and repairs the chain.
    async fn store_moved_segment(&self, tx: &mut R::Tx, segment: Segment) -> Result<Segment> {
        let chain = SegmentChain::load(&mut *tx, segment.span_id).await?;
        let clashes: Vec<String> = chain
            .overlapping(&segment.segment_range)
            .into_iter()
            .filter(|s| s.id != segment.id)
            .map(|s| s.segment_range.to_string())
            .collect();
        if !clashes.is_empty() {
            return Err(SegmentError::Overlap {
                proposed: segment.segment_range.to_string(),
                existing: clashes.join(", "),
            });
        }

        let span = tx.fetch_span(segment.span_id).await?;
        if !span.current_range.contains_range(&segment.segment_range) {
            self.extend_span_in(tx, span.id, Extent::Range(segment.segment_range))
                .await?;
        }

        let segment = self.save_segment(tx, segment).await?;
        repair::check_and_fix_relationships(&mut *tx, &self.notifier, segment.span_id).await?;
        tx.fetch_segment(segment.id).await
    }

    /// Splits a segment at `split_value`. The original keeps the lower part;
    /// the returned segment holds the upper part, copies the named fields
    /// and follows the original in the chain.
    pub async fn split_segment(
        &self,
        segment_id: Uuid,
        split_value: impl Into<BoundValue>,
        fields_to_copy: &[&str],
    ) -> Result<Segment> {
        let split_value = split_value.into();
        info!(%segment_id, %split_value, "splitting segment");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span_id = tx.fetch_segment(segment_id).await?.span_id;
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self
                .split_segment_in(&mut tx, segment_id, split_value, fields_to_copy)
                .await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    async fn split_segment_in(
        &self,
        tx: &mut R::Tx,
        segment_id: Uuid,
        split_value: BoundValue,
        fields_to_copy: &[&str],
    ) -> Result<Segment> {
        let mut segment = self.active_segment(tx, segment_id).await?;
        let kind = segment.segment_range.kind();
        kind.check_value(&split_value)?;
        if !(segment.lower() < split_value && split_value < segment.upper()) {
            return Err(SegmentError::InvalidSplitPoint {
                value: split_value.to_string(),
                range: segment.segment_range.to_string(),
            });
        }

        let upper_range = RangeValue::new(kind, split_value, segment.upper())?;
        let copied = segment.copy_fields(fields_to_copy);
        segment.segment_range =
            boundary::set_boundary(&segment.segment_range, split_value, Boundary::Upper)?;
        let segment = self.save_segment(tx, segment).await?;

        self.create_segment_in(tx, segment.span_id, upper_range, copied, Some(segment.id))
            .await
    }

    /// Absorbs the next segment into this one.
    pub async fn merge_segment_into_upper(&self, segment_id: Uuid) -> Result<Segment> {
        info!(%segment_id, "merging segment into upper neighbour");
        self.merge(segment_id, MergeDirection::Upper).await
    }

    /// Folds this segment into the previous one, returning the previous segment.
    pub async fn merge_segment_into_lower(&self, segment_id: Uuid) -> Result<Segment> {
        info!(%segment_id, "merging segment into lower neighbour");
        self.merge(segment_id, MergeDirection::Lower).await
    }

    async fn merge(&self, segment_id: Uuid, direction: MergeDirection) -> Result<Segment> {
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span_id = tx.fetch_segment(segment_id).await?.span_id;
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self.merge_in(&mut tx, segment_id, direction).await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    async fn merge_in(&self, tx: &mut R::Tx, segment_id: Uuid, direction: MergeDirection) -> Result<Segment> {
        let segment = tx.fetch_segment(segment_id).await?;
        let span = tx.fetch_span(segment.span_id).await?;
        let config = self.segment_config_for(&span)?;
        let chain = SegmentChain::load(&mut *tx, span.id).await?;

        let (keep, remove) = match direction {
            MergeDirection::Upper => {
                let next = chain.next(segment_id).cloned().ok_or(SegmentError::NoNeighbor {
                    segment: segment_id.to_string(),
                    direction: "next",
                })?;
                (segment, next)
            }
            MergeDirection::Lower => {
                let previous = chain.previous(segment_id).cloned().ok_or(SegmentError::NoNeighbor {
                    segment: segment_id.to_string(),
                    direction: "previous",
                })?;
                (previous, segment)
            }
        };

        let mut merged = keep;
        merged.segment_range =
            boundary::set_boundary(&merged.segment_range, remove.upper(), Boundary::Upper)?;
        merged.touch();
        debug!(kept = %merged.id, removed = %remove.id, range = %merged.segment_range, "merging segments");

        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Segment,
            Mutation::Update,
            EventPayload::Segment(merged.clone()),
        );
        let result: Result<Segment> = async {
            self.remove_segment(tx, remove, config.soft_delete, config.previous_on_delete)
                .await?;
            tx.update_segment(&merged).await?;
            Ok(merged)
        }
        .await;
        let merged = scope.finish(result, |s| EventPayload::Segment(s.clone()))?;

        repair::check_and_fix_relationships(&mut *tx, &self.notifier, span.id).await?;
        tx.fetch_segment(merged.id).await
    }

    /// Deletes one segment, softly or for good depending on its type.
    pub async fn delete_segment(&self, segment_id: Uuid) -> Result<()> {
        info!(%segment_id, "deleting segment");
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span_id = tx.fetch_segment(segment_id).await?.span_id;
            let scope = self.enter_span_update(&mut tx, span_id).await?;
            let result = self.delete_segment_in(&mut tx, segment_id).await;
            self.finish_span_update(&mut tx, scope, span_id, result).await
        }
        .await;
        settle(tx, result).await
    }

    pub(crate) async fn delete_segment_in(&self, tx: &mut R::Tx, segment_id: Uuid) -> Result<()> {
        let segment = tx.fetch_segment(segment_id).await?;
        let span = tx.fetch_span(segment.span_id).await?;
        let config = self.segment_config_for(&span)?;
        if config.soft_delete && segment.is_deleted() {
            return Ok(());
        }

        self.remove_segment(tx, segment, config.soft_delete, config.previous_on_delete)
            .await?;
        repair::check_and_fix_relationships(&mut *tx, &self.notifier, span.id).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeDirection {
    Upper,
    Lower,
}
