use chrono::Utc;
use segline_core::errors::{Result, SegmentError};
use segline_protocol::event::{EntityKind, EventPayload};
use segline_protocol::query::SegmentQuery;
use segline_protocol::range::{BoundValue, DeltaValue, RangeValue};
use segline_protocol::segment::Segment;
use segline_protocol::span::{Span, SpanBuilder};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::boundary::{self, Boundary, BoundaryMove, Extent};
use crate::chain::SegmentChain;
use crate::engine::{settle, SegmentEngine};
use crate::notifier::{Mutation, Notifier, SignalScope};
use crate::repair::{self, RepairOutcome};
use crate::repository::{Repository, Transaction};
use crate::validate::validate_partition;

impl<R, N> SegmentEngine<R, N>
where
    R: Repository,
    N: Notifier,
{
    /// Creates a span of a registered type. Types that disallow span gaps
    /// start with one segment covering the whole range.
    pub async fn create_span(
        &self,
        span_type: &str,
        range: RangeValue,
        fields: Map<String, Value>,
    ) -> Result<Span> {
        info!(%span_type, %range, "creating span");
        let span = SpanBuilder::new(span_type, range).fields(fields).build();
        let config = self.span_config_for(&span)?;
        if !config.allow_span_gaps {
            self.segment_config_for(&span)?;
        }

        let mut tx = self.repository.begin().await?;
        let result = self.create_span_in(&mut tx, span, config.allow_span_gaps).await;
        settle(tx, result).await
    }

    async fn create_span_in(&self, tx: &mut R::Tx, span: Span, allow_span_gaps: bool) -> Result<Span> {
        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Span,
            Mutation::Create,
            EventPayload::ProposedSpan {
                span_type: span.span_type.clone(),
                range: span.current_range,
            },
        );
        let result = tx.insert_span(&span).await.map(|_| span);
        let span = scope.finish(result, |s| EventPayload::Span(s.clone()))?;

        if !allow_span_gaps {
            debug!(span_id = %span.id, "creating initial segment for gapless span");
            self.create_segment_in(tx, span.id, span.current_range, Map::new(), None)
                .await?;
        }
        Ok(span)
    }

    /// Grows the span's current range to cover a value or a range.
    pub async fn extend_span(&self, span_id: Uuid, extent: impl Into<Extent>) -> Result<Span> {
        let extent = extent.into();
        info!(%span_id, ?extent, "extending span");
        let mut tx = self.repository.begin().await?;
        let result = self.extend_span_in(&mut tx, span_id, extent).await;
        settle(tx, result).await
    }

    pub(crate) async fn extend_span_in(&self, tx: &mut R::Tx, span_id: Uuid, extent: Extent) -> Result<Span> {
        let mut span = tx.fetch_span(span_id).await?;
        let extended = boundary::extend(&span.current_range, extent)?;
        if extended == span.current_range {
            return Ok(span);
        }
        debug!(%span_id, from = %span.current_range, to = %extended, "extending span range");
        span.current_range = extended;
        self.save_span(tx, span).await
    }

    /// Moves the span and every active segment by the same delta.
    pub async fn shift_span(&self, span_id: Uuid, delta: impl Into<DeltaValue>) -> Result<Span> {
        let delta = delta.into();
        info!(%span_id, %delta, "shifting span");
        let mut tx = self.repository.begin().await?;
        let result = self.shift_span_in(&mut tx, span_id, delta).await;
        settle(tx, result).await
    }

    async fn shift_span_in(&self, tx: &mut R::Tx, span_id: Uuid, delta: DeltaValue) -> Result<Span> {
        let mut span = tx.fetch_span(span_id).await?;
        span.current_range = boundary::shift(&span.current_range, &delta)?;
        span.touch();

        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Span,
            Mutation::Update,
            EventPayload::Span(span.clone()),
        );
        let result: Result<Span> = async {
            let chain = SegmentChain::load(&mut *tx, span.id).await?;
            debug!(%span_id, segments = chain.len(), "shifting segments with span");
            for mut segment in chain.into_segments() {
                segment.segment_range = boundary::shift(&segment.segment_range, &delta)?;
                self.save_segment(tx, segment).await?;
            }
            tx.update_span(&span).await?;
            Ok(span)
        }
        .await;
        scope.finish(result, |s| EventPayload::Span(s.clone()))
    }

    /// Moves one boundary of the span.
    ///
    /// Segments left entirely outside the new range are deleted, a gap at
    /// the moved edge is closed when span gaps are disallowed, and segments
    /// reaching past the new bound are clipped to it.
    pub async fn shift_span_boundary(
        &self,
        span_id: Uuid,
        which: Boundary,
        movement: BoundaryMove,
    ) -> Result<Span> {
        info!(%span_id, %which, ?movement, "shifting span boundary");
        let mut tx = self.repository.begin().await?;
        let result = self.shift_span_boundary_in(&mut tx, span_id, which, movement).await;
        settle(tx, result).await
    }

    async fn shift_span_boundary_in(
        &self,
        tx: &mut R::Tx,
        span_id: Uuid,
        which: Boundary,
        movement: BoundaryMove,
    ) -> Result<Span> {
        let mut span = tx.fetch_span(span_id).await?;
        let config = self.span_config_for(&span)?;
        let segment_config = self.segment_config_for(&span)?;

        let value = boundary::resolve_move(&span.current_range, which, &movement)?;
        boundary::ensure_not_crossing(&span.current_range, which, &value)?;
        debug!(%span_id, %which, from = %which.of(&span.current_range), to = %value, "moving span bound");

        span.current_range = boundary::set_boundary(&span.current_range, value, which)?;
        span.touch();

        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Span,
            Mutation::Update,
            EventPayload::Span(span.clone()),
        );
        let result: Result<Span> = async {
            let chain = SegmentChain::load(&mut *tx, span.id).await?;
            for stale in chain.into_segments() {
                if !lies_beyond(&stale, which, &value) {
                    continue;
                }
                // A cascading hard delete may already have taken it.
                if let Some(segment) = self.refetch_active(tx, stale.id).await? {
                    self.remove_segment(
                        tx,
                        segment,
                        config.soft_delete,
                        segment_config.previous_on_delete,
                    )
                    .await?;
                }
            }

            if !config.allow_span_gaps {
                let chain = SegmentChain::load(&mut *tx, span.id).await?;
                let edge = match which {
                    Boundary::Lower => chain.first(),
                    Boundary::Upper => chain.last(),
                };
                if let Some(segment) = edge.cloned() {
                    let gap = match which {
                        Boundary::Lower => segment.lower() > value,
                        Boundary::Upper => segment.upper() < value,
                    };
                    if gap {
                        self.move_segment_bound(tx, segment, which, value).await?;
                    }
                }
            }

            let chain = SegmentChain::load(&mut *tx, span.id).await?;
            for segment in chain.into_segments() {
                let reaches_past = match which {
                    Boundary::Lower => segment.lower() < value,
                    Boundary::Upper => segment.upper() > value,
                };
                if reaches_past {
                    self.move_segment_bound(tx, segment, which, value).await?;
                }
            }

            tx.update_span(&span).await?;
            Ok(span)
        }
        .await;
        let span = scope.finish(result, |s| EventPayload::Span(s.clone()))?;

        repair::check_and_fix_relationships(tx, &self.notifier, span.id).await?;
        Ok(span)
    }

    async fn move_segment_bound(
        &self,
        tx: &mut R::Tx,
        mut segment: Segment,
        which: Boundary,
        value: BoundValue,
    ) -> Result<Segment> {
        debug!(segment_id = %segment.id, %which, to = %value, "adjusting segment bound");
        segment.segment_range = boundary::set_boundary(&segment.segment_range, value, which)?;
        self.save_segment(tx, segment).await
    }

    /// Appends a segment after the last one, growing the span as needed.
    /// Exactly one of `to_value` and `delta` must be given.
    pub async fn append_segment(
        &self,
        span_id: Uuid,
        to_value: Option<BoundValue>,
        delta: Option<DeltaValue>,
        fields: Map<String, Value>,
    ) -> Result<Segment> {
        let movement = match (to_value, delta) {
            (Some(value), None) => BoundaryMove::To(value),
            (None, Some(delta)) => BoundaryMove::By(delta),
            _ => {
                return Err(SegmentError::InvalidArgument(
                    "exactly one of to_value or delta must be provided".into(),
                ))
            }
        };
        info!(%span_id, ?movement, "appending segment");
        let mut tx = self.repository.begin().await?;
        let result = self.append_segment_in(&mut tx, span_id, movement, fields).await;
        settle(tx, result).await
    }

    async fn append_segment_in(
        &self,
        tx: &mut R::Tx,
        span_id: Uuid,
        movement: BoundaryMove,
        fields: Map<String, Value>,
    ) -> Result<Segment> {
        let span = tx.fetch_span(span_id).await?;
        let value = boundary::resolve_move(&span.current_range, Boundary::Upper, &movement)?;

        let chain = SegmentChain::load(&mut *tx, span_id).await?;
        let last = chain.last().cloned();
        let start = last
            .as_ref()
            .map(|segment| segment.upper())
            .unwrap_or_else(|| span.current_range.lower());
        if value <= start {
            return Err(SegmentError::invalid_boundary(format!(
                "appended bound {} must exceed the span's upper bound {} or the last segment's upper bound {}",
                value,
                span.current_range.upper(),
                start
            )));
        }

        let range = RangeValue::new(span.current_range.kind(), start, value)?;
        self.extend_span_in(tx, span_id, Extent::Value(value)).await?;
        self.create_segment_in(tx, span_id, range, fields, last.map(|segment| segment.id))
            .await
    }

    /// Deletes the span and its segments, softly or for good depending on
    /// the span type.
    pub async fn delete_span(&self, span_id: Uuid) -> Result<()> {
        info!(%span_id, "deleting span");
        let mut tx = self.repository.begin().await?;
        let result = self.delete_span_in(&mut tx, span_id).await;
        settle(tx, result).await
    }

    async fn delete_span_in(&self, tx: &mut R::Tx, span_id: Uuid) -> Result<()> {
        let mut span = tx.fetch_span(span_id).await?;
        let config = self.span_config_for(&span)?;

        if config.soft_delete {
            span.deleted_at = Some(Utc::now());
            span.touch();
            let scope = SignalScope::enter(
                &self.notifier,
                EntityKind::Span,
                Mutation::SoftDelete,
                EventPayload::Span(span.clone()),
            );
            let result: Result<Span> = async {
                let chain = SegmentChain::load(&mut *tx, span_id).await?;
                for stale in chain.segments() {
                    if self.refetch_active(tx, stale.id).await?.is_some() {
                        self.delete_segment_in(tx, stale.id).await?;
                    }
                }
                tx.update_span(&span).await?;
                Ok(span)
            }
            .await;
            scope.finish(result, |s| EventPayload::Span(s.clone()))?;
        } else {
            let scope = SignalScope::enter(
                &self.notifier,
                EntityKind::Span,
                Mutation::Delete,
                EventPayload::Span(span.clone()),
            );
            let result: Result<Span> = async {
                let rows = tx.query_segments(SegmentQuery::all(span_id)).await?;
                for segment in rows {
                    let scope = SignalScope::enter(
                        &self.notifier,
                        EntityKind::Segment,
                        Mutation::Delete,
                        EventPayload::Segment(segment.clone()),
                    );
                    let result = tx.delete_segment(segment.id).await.map(|_| segment);
                    scope.finish(result, |s| EventPayload::Segment(s.clone()))?;
                }
                tx.delete_span(span_id).await?;
                Ok(span)
            }
            .await;
            scope.finish(result, |s| EventPayload::Span(s.clone()))?;
        }
        Ok(())
    }

    /// Rebuilds the span's `previous_segment_id` links from the sort order.
    pub async fn check_and_fix_relationships(&self, span_id: Uuid) -> Result<RepairOutcome> {
        info!(%span_id, "checking segment relationships");
        let mut tx = self.repository.begin().await?;
        let result = repair::check_and_fix_relationships(&mut tx, &self.notifier, span_id).await;
        settle(tx, result).await
    }

    /// Checks containment, gap policy and overlap for the span's active segments.
    pub async fn validate_span(&self, span_id: Uuid) -> Result<()> {
        let mut tx = self.repository.begin().await?;
        let result = async {
            let span = tx.fetch_span(span_id).await?;
            let config = self.span_config_for(&span)?;
            let chain = SegmentChain::load(&mut tx, span_id).await?;
            validate_partition(&span, &chain, &config)
        }
        .await;
        settle(tx, result).await
    }
}

/// Whether a segment ends up with no part inside the span once `which` moves to `value`.
fn lies_beyond(segment: &Segment, which: Boundary, value: &BoundValue) -> bool {
    match which {
        Boundary::Lower => segment.upper() <= *value,
        Boundary::Upper => segment.lower() >= *value,
    }
}
