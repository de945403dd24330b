use std::sync::Arc;

use chrono::Utc;
use segline_core::config::PreviousOnDelete;
use segline_core::errors::{Result, SegmentError};
use segline_protocol::event::{EntityKind, EventPayload};
use segline_protocol::query::{SegmentQuery, SegmentStatus};
use segline_protocol::segment::Segment;
use segline_protocol::span::Span;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chain::{Placement, SegmentChain};
use crate::notifier::{Mutation, Notifier, SignalScope, TracingNotifier};
use crate::registry::{ConfigProvider, SegmentConfig, SpanConfig};
use crate::repository::{Repository, Transaction};

/// Entry point for every span and segment operation.
///
/// Each public operation runs in its own transaction; operations composed
/// of others share that one transaction.
pub struct SegmentEngine<R, N = TracingNotifier> {
    pub(crate) repository: R,
    pub(crate) notifier: N,
    pub(crate) config: Arc<dyn ConfigProvider>,
}

impl<R: Repository> SegmentEngine<R, TracingNotifier> {
    pub fn new(repository: R, config: Arc<dyn ConfigProvider>) -> Self {
        Self::with_notifier(repository, TracingNotifier, config)
    }
}

impl<R, N> SegmentEngine<R, N>
where
    R: Repository,
    N: Notifier,
{
    pub fn with_notifier(repository: R, notifier: N, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            repository,
            notifier,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    pub async fn get_span(&self, span_id: Uuid) -> Result<Span> {
        let mut tx = self.repository.begin().await?;
        let result = tx.fetch_span(span_id).await;
        settle(tx, result).await
    }

    pub async fn get_segment(&self, segment_id: Uuid) -> Result<Segment> {
        let mut tx = self.repository.begin().await?;
        let result = tx.fetch_segment(segment_id).await;
        settle(tx, result).await
    }

    /// Active, inactive or all segments of a span in sort order.
    pub async fn segments(&self, span_id: Uuid, status: SegmentStatus) -> Result<Vec<Segment>> {
        let mut tx = self.repository.begin().await?;
        let result = tx.query_segments(SegmentQuery { span_id, status }).await;
        settle(tx, result).await
    }

    pub async fn chain(&self, span_id: Uuid) -> Result<SegmentChain> {
        let mut tx = self.repository.begin().await?;
        let result = SegmentChain::load(&mut tx, span_id).await;
        settle(tx, result).await
    }

    pub async fn segment_count(&self, span_id: Uuid) -> Result<usize> {
        Ok(self.chain(span_id).await?.len())
    }

    /// Earliest active segment of the span.
    pub async fn first_segment(&self, span_id: Uuid) -> Result<Option<Segment>> {
        Ok(self.chain(span_id).await?.first().cloned())
    }

    /// Latest active segment of the span.
    pub async fn last_segment(&self, span_id: Uuid) -> Result<Option<Segment>> {
        Ok(self.chain(span_id).await?.last().cloned())
    }

    pub async fn previous_segment(&self, segment_id: Uuid) -> Result<Option<Segment>> {
        let segment = self.get_segment(segment_id).await?;
        let chain = self.chain(segment.span_id).await?;
        Ok(chain.previous(segment_id).cloned())
    }

    pub async fn next_segment(&self, segment_id: Uuid) -> Result<Option<Segment>> {
        let segment = self.get_segment(segment_id).await?;
        let chain = self.chain(segment.span_id).await?;
        Ok(chain.next(segment_id).cloned())
    }

    pub async fn placement(&self, segment_id: Uuid) -> Result<Placement> {
        let segment = self.get_segment(segment_id).await?;
        let chain = self.chain(segment.span_id).await?;
        Ok(chain.placement(segment_id))
    }

    pub(crate) fn span_config_for(&self, span: &Span) -> Result<SpanConfig> {
        let config = self.config.span_config(&span.span_type)?;
        if config.range_value_type != span.current_range.kind() {
            return Err(SegmentError::type_mismatch(
                config.range_value_type,
                span.current_range.kind(),
            ));
        }
        Ok(config)
    }

    pub(crate) fn segment_config_for(&self, span: &Span) -> Result<SegmentConfig> {
        self.config.segment_model_for_span(&span.span_type)
    }

    /// Stores an updated span inside an update scope.
    pub(crate) async fn save_span(&self, tx: &mut R::Tx, mut span: Span) -> Result<Span> {
        span.touch();
        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Span,
            Mutation::Update,
            EventPayload::Span(span.clone()),
        );
        let result = tx.update_span(&span).await.map(|_| span);
        scope.finish(result, |s| EventPayload::Span(s.clone()))
    }

    /// Stores an updated segment inside an update scope.
    pub(crate) async fn save_segment(&self, tx: &mut R::Tx, mut segment: Segment) -> Result<Segment> {
        segment.touch();
        let scope = SignalScope::enter(
            &self.notifier,
            EntityKind::Segment,
            Mutation::Update,
            EventPayload::Segment(segment.clone()),
        );
        let result = tx.update_segment(&segment).await.map(|_| segment);
        scope.finish(result, |s| EventPayload::Segment(s.clone()))
    }

    /// Re-reads a segment taken from an earlier chain snapshot. Rows removed
    /// or soft deleted since then come back as `None`.
    pub(crate) async fn refetch_active(&self, tx: &mut R::Tx, segment_id: Uuid) -> Result<Option<Segment>> {
        match tx.fetch_segment(segment_id).await {
            Ok(segment) if segment.is_deleted() => Ok(None),
            Ok(segment) => Ok(Some(segment)),
            Err(SegmentError::SegmentNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Opens the span update scope a segment operation runs in.
    pub(crate) async fn enter_span_update(&self, tx: &mut R::Tx, span_id: Uuid) -> Result<SignalScope<'_, N>> {
        let span = tx.fetch_span(span_id).await?;
        Ok(SignalScope::enter(
            &self.notifier,
            EntityKind::Span,
            Mutation::Update,
            EventPayload::Span(span),
        ))
    }

    /// Closes a scope from [`Self::enter_span_update`] with the span as stored now.
    pub(crate) async fn finish_span_update<T>(
        &self,
        tx: &mut R::Tx,
        scope: SignalScope<'_, N>,
        span_id: Uuid,
        result: Result<T>,
    ) -> Result<T> {
        let result = match result {
            Ok(value) => tx.fetch_span(span_id).await.map(|span| (value, span)),
            Err(err) => Err(err),
        };
        scope
            .finish(result, |(_, span)| EventPayload::Span(span.clone()))
            .map(|(value, _)| value)
    }

    /// Soft or hard deletes one segment without touching the chain links of
    /// the remaining segments beyond what `policy` asks for.
    pub(crate) async fn remove_segment(
        &self,
        tx: &mut R::Tx,
        segment: Segment,
        soft_delete: bool,
        policy: PreviousOnDelete,
    ) -> Result<()> {
        if soft_delete {
            let mut segment = segment;
            segment.deleted_at = Some(Utc::now());
            segment.touch();
            debug!(segment_id = %segment.id, range = %segment.segment_range, "soft deleting segment");
            let scope = SignalScope::enter(
                &self.notifier,
                EntityKind::Segment,
                Mutation::SoftDelete,
                EventPayload::Segment(segment.clone()),
            );
            let result = tx.update_segment(&segment).await.map(|_| segment);
            scope.finish(result, |s| EventPayload::Segment(s.clone()))?;
            return Ok(());
        }

        let mut pending = vec![segment];
        while let Some(segment) = pending.pop() {
            let dependents: Vec<Segment> = tx
                .query_segments(SegmentQuery::all(segment.span_id))
                .await?
                .into_iter()
                .filter(|s| s.previous_segment_id == Some(segment.id))
                .collect();

            match policy {
                PreviousOnDelete::Protect if !dependents.is_empty() => {
                    let referenced_by: Vec<String> =
                        dependents.iter().map(|s| s.id.to_string()).collect();
                    return Err(SegmentError::ProtectedPrevious {
                        segment: segment.id.to_string(),
                        referenced_by: referenced_by.join(", "),
                    });
                }
                PreviousOnDelete::Cascade => pending.extend(dependents),
                PreviousOnDelete::SetNull => {
                    for mut dependent in dependents {
                        dependent.previous_segment_id = None;
                        self.save_segment(tx, dependent).await?;
                    }
                }
                PreviousOnDelete::Protect | PreviousOnDelete::DoNothing => {}
            }

            debug!(segment_id = %segment.id, range = %segment.segment_range, "deleting segment");
            let scope = SignalScope::enter(
                &self.notifier,
                EntityKind::Segment,
                Mutation::Delete,
                EventPayload::Segment(segment.clone()),
            );
            let result = tx.delete_segment(segment.id).await.map(|_| segment);
            scope.finish(result, |s| EventPayload::Segment(s.clone()))?;
        }
        Ok(())
    }
}

/// Commits on success, rolls back on failure and hands back the result.
pub(crate) async fn settle<T, Tx: Transaction>(tx: Tx, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}
