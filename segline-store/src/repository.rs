use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use segline_core::config::SegmentSettings;
use segline_core::db::{DatabaseMigrator, DatabasePool};
use segline_core::errors::{Result, SegmentError};
use segline_engine::repository::{Repository, Transaction};
use segline_protocol::query::{SegmentQuery, SegmentStatus};
use segline_protocol::range::RangeValueKind;
use segline_protocol::segment::Segment;
use segline_protocol::span::Span;
use serde_json::{Map, Value};
use sqlx::postgres::types::PgRange;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::ranges::RangeColumns;

const SPAN_COLUMNS: &str = "id, span_type, range_kind, \
     init_int4, init_int8, init_num, init_date, init_tstz, \
     cur_int4, cur_int8, cur_num, cur_date, cur_tstz, \
     deleted_at, fields, created_at, updated_at";

const SEGMENT_COLUMNS: &str = "id, span_id, range_kind, \
     int4_range, int8_range, num_range, date_range, tstz_range, \
     previous_segment_id, deleted_at, fields, created_at, updated_at";

/// Owns the span and segment table migrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeglineMigrator;

#[async_trait]
impl DatabaseMigrator for SeglineMigrator {
    async fn run_migrations(&self, pool: &DatabasePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool.inner()).await?;
        Ok(())
    }
}

/// Database-backed repository for spans and segments.
#[derive(Clone)]
pub struct PgRepository {
    pool: DatabasePool,
}

impl PgRepository {
    /// Connects using the configured database URL and ensures migrations ran.
    pub async fn from_settings(settings: &SegmentSettings) -> Result<Self> {
        let pool = DatabasePool::connect(settings).await?;
        Self::from_pool(pool).await
    }

    /// Builds the repository from an existing database pool.
    pub async fn from_pool(pool: DatabasePool) -> Result<Self> {
        SeglineMigrator.run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.inner().begin().await?;
        Ok(PgTransaction { tx })
    }
}

/// One database transaction. Overlap and chain-link constraints are
/// deferred, so they are only checked on `commit`.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn insert_span(&mut self, span: &Span) -> Result<()> {
        let initial = RangeColumns::from_range(&span.initial_range)?;
        let current = RangeColumns::from_range(&span.current_range)?;
        let sql = format!(
            "INSERT INTO segline_spans ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            SPAN_COLUMNS
        );
        sqlx::query(&sql)
            .bind(span.id)
            .bind(&span.span_type)
            .bind(span.current_range.kind().as_str())
            .bind(initial.int4)
            .bind(initial.int8)
            .bind(initial.num)
            .bind(initial.date)
            .bind(initial.tstz)
            .bind(current.int4)
            .bind(current.int8)
            .bind(current.num)
            .bind(current.date)
            .bind(current.tstz)
            .bind(span.deleted_at)
            .bind(Value::Object(span.fields.clone()))
            .bind(span.created_at)
            .bind(span.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_span(&mut self, span: &Span) -> Result<()> {
        let current = RangeColumns::from_range(&span.current_range)?;
        let result = sqlx::query(
            r#"
            UPDATE segline_spans SET
                cur_int4 = $2, cur_int8 = $3, cur_num = $4, cur_date = $5, cur_tstz = $6,
                deleted_at = $7, fields = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(span.id)
        .bind(current.int4)
        .bind(current.int8)
        .bind(current.num)
        .bind(current.date)
        .bind(current.tstz)
        .bind(span.deleted_at)
        .bind(Value::Object(span.fields.clone()))
        .bind(span.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SegmentError::SpanNotFound(span.id.to_string()));
        }
        Ok(())
    }

    async fn delete_span(&mut self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM segline_spans WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SegmentError::SpanNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_span(&mut self, id: Uuid) -> Result<Span> {
        let sql = format!("SELECT {} FROM segline_spans WHERE id = $1", SPAN_COLUMNS);
        let row = sqlx::query_as::<_, SpanRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| SegmentError::SpanNotFound(id.to_string()))?;
        row.try_into()
    }

    async fn insert_segment(&mut self, segment: &Segment) -> Result<()> {
        let range = RangeColumns::from_range(&segment.segment_range)?;
        let sql = format!(
            "INSERT INTO segline_segments ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            SEGMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(segment.id)
            .bind(segment.span_id)
            .bind(segment.segment_range.kind().as_str())
            .bind(range.int4)
            .bind(range.int8)
            .bind(range.num)
            .bind(range.date)
            .bind(range.tstz)
            .bind(segment.previous_segment_id)
            .bind(segment.deleted_at)
            .bind(Value::Object(segment.fields.clone()))
            .bind(segment.created_at)
            .bind(segment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| {
                let missing_span = err
                    .as_database_error()
                    .and_then(|db| db.constraint())
                    .map_or(false, |name| name.ends_with("span_id_fkey"));
                if missing_span {
                    SegmentError::SpanNotFound(segment.span_id.to_string())
                } else {
                    SegmentError::from(err)
                }
            })?;
        Ok(())
    }

    async fn update_segment(&mut self, segment: &Segment) -> Result<()> {
        let range = RangeColumns::from_range(&segment.segment_range)?;
        let result = sqlx::query(
            r#"
            UPDATE segline_segments SET
                int4_range = $2, int8_range = $3, num_range = $4, date_range = $5, tstz_range = $6,
                previous_segment_id = $7, deleted_at = $8, fields = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(segment.id)
        .bind(range.int4)
        .bind(range.int8)
        .bind(range.num)
        .bind(range.date)
        .bind(range.tstz)
        .bind(segment.previous_segment_id)
        .bind(segment.deleted_at)
        .bind(Value::Object(segment.fields.clone()))
        .bind(segment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SegmentError::SegmentNotFound(segment.id.to_string()));
        }
        Ok(())
    }

    async fn delete_segment(&mut self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM segline_segments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SegmentError::SegmentNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_segment(&mut self, id: Uuid) -> Result<Segment> {
        let sql = format!("SELECT {} FROM segline_segments WHERE id = $1", SEGMENT_COLUMNS);
        let row = sqlx::query_as::<_, SegmentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| SegmentError::SegmentNotFound(id.to_string()))?;
        row.try_into()
    }

    async fn query_segments(&mut self, query: SegmentQuery) -> Result<Vec<Segment>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM segline_segments WHERE span_id = ",
            SEGMENT_COLUMNS
        ));
        builder.push_bind(query.span_id);
        match query.status {
            SegmentStatus::Active => {
                builder.push(" AND deleted_at IS NULL");
            }
            SegmentStatus::Inactive => {
                builder.push(" AND deleted_at IS NOT NULL");
            }
            SegmentStatus::All => {}
        }
        // Rows of one span share a kind, so only one range column is non-null.
        builder.push(" ORDER BY int4_range, int8_range, num_range, date_range, tstz_range, id");

        let rows = builder
            .build_query_as::<SegmentRow>()
            .fetch_all(&mut *self.tx)
            .await?;
        debug!(span_id = %query.span_id, status = ?query.status, rows = rows.len(), "queried segments");
        rows.into_iter().map(Segment::try_from).collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(commit_error)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Deferred exclusion violations surface on commit; report them as overlaps.
fn commit_error(err: sqlx::Error) -> SegmentError {
    if let Some(db) = err.as_database_error() {
        if db
            .constraint()
            .map_or(false, |name| name.starts_with("segline_segments_no_overlap"))
        {
            return SegmentError::Overlap {
                proposed: "pending segment changes".into(),
                existing: db.message().to_string(),
            };
        }
    }
    SegmentError::from(err)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[derive(FromRow)]
struct SpanRow {
    id: Uuid,
    span_type: String,
    range_kind: String,
    init_int4: Option<PgRange<i32>>,
    init_int8: Option<PgRange<i64>>,
    init_num: Option<PgRange<Decimal>>,
    init_date: Option<PgRange<NaiveDate>>,
    init_tstz: Option<PgRange<DateTime<Utc>>>,
    cur_int4: Option<PgRange<i32>>,
    cur_int8: Option<PgRange<i64>>,
    cur_num: Option<PgRange<Decimal>>,
    cur_date: Option<PgRange<NaiveDate>>,
    cur_tstz: Option<PgRange<DateTime<Utc>>>,
    deleted_at: Option<DateTime<Utc>>,
    fields: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SpanRow> for Span {
    type Error = SegmentError;

    fn try_from(row: SpanRow) -> Result<Self> {
        let kind: RangeValueKind = row.range_kind.parse()?;
        let initial_range = RangeColumns {
            int4: row.init_int4,
            int8: row.init_int8,
            num: row.init_num,
            date: row.init_date,
            tstz: row.init_tstz,
        }
        .into_range(kind)?;
        let current_range = RangeColumns {
            int4: row.cur_int4,
            int8: row.cur_int8,
            num: row.cur_num,
            date: row.cur_date,
            tstz: row.cur_tstz,
        }
        .into_range(kind)?;

        Ok(Span {
            id: row.id,
            span_type: row.span_type,
            initial_range,
            current_range,
            deleted_at: row.deleted_at,
            fields: into_map(row.fields),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SegmentRow {
    id: Uuid,
    span_id: Uuid,
    range_kind: String,
    int4_range: Option<PgRange<i32>>,
    int8_range: Option<PgRange<i64>>,
    num_range: Option<PgRange<Decimal>>,
    date_range: Option<PgRange<NaiveDate>>,
    tstz_range: Option<PgRange<DateTime<Utc>>>,
    previous_segment_id: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    fields: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SegmentRow> for Segment {
    type Error = SegmentError;

    fn try_from(row: SegmentRow) -> Result<Self> {
        let kind: RangeValueKind = row.range_kind.parse()?;
        let segment_range = RangeColumns {
            int4: row.int4_range,
            int8: row.int8_range,
            num: row.num_range,
            date: row.date_range,
            tstz: row.tstz_range,
        }
        .into_range(kind)?;

        Ok(Segment {
            id: row.id,
            span_id: row.span_id,
            segment_range,
            previous_segment_id: row.previous_segment_id,
            deleted_at: row.deleted_at,
            fields: into_map(row.fields),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
