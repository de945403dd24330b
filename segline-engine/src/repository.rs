use async_trait::async_trait;
use segline_core::errors::Result;
use segline_protocol::query::SegmentQuery;
use segline_protocol::segment::Segment;
use segline_protocol::span::Span;
use uuid::Uuid;

/// Storage backend able to open atomic units of work.
#[async_trait]
pub trait Repository: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// One atomic unit of work. Nothing written through it is visible to other
/// transactions before `commit`; dropping it without committing discards it.
#[async_trait]
pub trait Transaction: Send {
    async fn insert_span(&mut self, span: &Span) -> Result<()>;

    async fn update_span(&mut self, span: &Span) -> Result<()>;

    /// Removes the span row together with any segment rows still attached.
    async fn delete_span(&mut self, id: Uuid) -> Result<()>;

    /// Fails with `SpanNotFound` when no row exists.
    async fn fetch_span(&mut self, id: Uuid) -> Result<Span>;

    async fn insert_segment(&mut self, segment: &Segment) -> Result<()>;

    async fn update_segment(&mut self, segment: &Segment) -> Result<()>;

    async fn delete_segment(&mut self, id: Uuid) -> Result<()>;

    /// Fails with `SegmentNotFound` when no row exists.
    async fn fetch_segment(&mut self, id: Uuid) -> Result<Segment>;

    /// Segments matching the query, ordered by lower bound then upper bound.
    async fn query_segments(&mut self, query: SegmentQuery) -> Result<Vec<Segment>>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
