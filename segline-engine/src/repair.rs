//! Resynchronizes the cached `previous_segment_id` links with the sort order.
//!
//! States: a chain is `Valid` when every active segment links to the one
//! sorted before it (the first links to nothing). Anything else is desynced
//! and one fix sweep rewrites every drifted link, so a single invocation
//! always ends in `Valid`.

use segline_core::errors::{Result, SegmentError};
use segline_protocol::event::{EntityKind, EventPayload};
use segline_protocol::query::SegmentQuery;
use segline_protocol::segment::Segment;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::chain::SegmentChain;
use crate::notifier::{Mutation, Notifier, SignalScope};
use crate::repository::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Links already matched the sort order; nothing was written.
    Valid,
    Fixed { updated: usize },
}

/// Validate pass. Fails with `RelationshipInconsistency` on the first drifted link.
pub fn validate_relationships(chain: &SegmentChain) -> Result<()> {
    let mut expected: Option<Uuid> = None;
    for (index, segment) in chain.segments().iter().enumerate() {
        if segment.previous_segment_id != expected {
            let reason = if index == 0 {
                format!(
                    "first segment {} should have no previous segment",
                    segment.id
                )
            } else {
                format!(
                    "segment {} at position {} should follow {:?}, links to {:?}",
                    segment.id, index, expected, segment.previous_segment_id
                )
            };
            return Err(SegmentError::RelationshipInconsistency(reason));
        }
        expected = Some(segment.id);
    }
    Ok(())
}

/// Fix pass over every row of one span. Returns the rows whose link changes:
/// inactive rows lose their link, active rows link to their sorted predecessor.
pub fn plan_repair(segments: &[Segment]) -> Vec<Segment> {
    let mut changes: Vec<Segment> = segments
        .iter()
        .filter(|s| s.is_deleted() && s.previous_segment_id.is_some())
        .cloned()
        .map(|mut segment| {
            segment.previous_segment_id = None;
            segment
        })
        .collect();

    let chain = SegmentChain::new(segments.iter().cloned());
    let mut expected: Option<Uuid> = None;
    for segment in chain.segments() {
        if segment.previous_segment_id != expected {
            let mut relinked = segment.clone();
            relinked.previous_segment_id = expected;
            changes.push(relinked);
        }
        expected = Some(segment.id);
    }
    changes
}

/// Validates the span's chain and repairs it when it drifted.
pub async fn check_and_fix_relationships<T, N>(
    tx: &mut T,
    notifier: &N,
    span_id: Uuid,
) -> Result<RepairOutcome>
where
    T: Transaction + ?Sized,
    N: Notifier + ?Sized,
{
    let chain = SegmentChain::load(tx, span_id).await?;
    match validate_relationships(&chain) {
        Ok(()) => Ok(RepairOutcome::Valid),
        Err(SegmentError::RelationshipInconsistency(reason)) => {
            debug!(%span_id, %reason, "repairing segment relationships");
            let rows = tx.query_segments(SegmentQuery::all(span_id)).await?;
            let changes = plan_repair(&rows);
            let updated = changes.len();

            for mut segment in changes {
                segment.touch();
                let scope = SignalScope::enter(
                    notifier,
                    EntityKind::Segment,
                    Mutation::Update,
                    EventPayload::Segment(segment.clone()),
                );
                let result = tx.update_segment(&segment).await.map(|_| segment);
                scope.finish(result, |s| EventPayload::Segment(s.clone()))?;
            }

            debug!(%span_id, updated, "segment relationships repaired");
            Ok(RepairOutcome::Fixed { updated })
        }
        Err(other) => Err(other),
    }
}
