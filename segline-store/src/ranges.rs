//! Mapping between [`RangeValue`] and the native Postgres range columns.
//!
//! Every stored range occupies one nullable column per [`RangeValueKind`];
//! only the column of the row's `range_kind` is populated. Ranges are
//! always written half-open, which is also the canonical form Postgres
//! uses for the discrete range types.

use std::ops::Bound;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use segline_core::errors::{Result, SegmentError};
use segline_protocol::range::{BoundValue, RangeValue, RangeValueKind};
use sqlx::postgres::types::PgRange;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeColumns {
    pub int4: Option<PgRange<i32>>,
    pub int8: Option<PgRange<i64>>,
    pub num: Option<PgRange<Decimal>>,
    pub date: Option<PgRange<NaiveDate>>,
    pub tstz: Option<PgRange<DateTime<Utc>>>,
}

impl RangeColumns {
    pub fn from_range(range: &RangeValue) -> Result<Self> {
        let mut columns = Self::default();
        match (range.kind(), range.lower(), range.upper()) {
            (RangeValueKind::Integer, BoundValue::Int(lower), BoundValue::Int(upper)) => {
                columns.int4 = Some(half_open(narrow(lower)?, narrow(upper)?));
            }
            (RangeValueKind::BigInteger, BoundValue::Int(lower), BoundValue::Int(upper)) => {
                columns.int8 = Some(half_open(lower, upper));
            }
            (RangeValueKind::Decimal, BoundValue::Decimal(lower), BoundValue::Decimal(upper)) => {
                columns.num = Some(half_open(lower, upper));
            }
            (RangeValueKind::Date, BoundValue::Date(lower), BoundValue::Date(upper)) => {
                columns.date = Some(half_open(lower, upper));
            }
            (RangeValueKind::Timestamp, BoundValue::Timestamp(lower), BoundValue::Timestamp(upper)) => {
                columns.tstz = Some(half_open(lower, upper));
            }
            (kind, lower, _) => {
                return Err(SegmentError::type_mismatch(
                    kind,
                    format!("{:?}", lower.scalar_kind()),
                ))
            }
        }
        Ok(columns)
    }

    /// Kinds whose column holds a value.
    pub fn populated(&self) -> Vec<RangeValueKind> {
        let mut kinds = Vec::new();
        if self.int4.is_some() {
            kinds.push(RangeValueKind::Integer);
        }
        if self.int8.is_some() {
            kinds.push(RangeValueKind::BigInteger);
        }
        if self.num.is_some() {
            kinds.push(RangeValueKind::Decimal);
        }
        if self.date.is_some() {
            kinds.push(RangeValueKind::Date);
        }
        if self.tstz.is_some() {
            kinds.push(RangeValueKind::Timestamp);
        }
        kinds
    }

    pub fn into_range(self, kind: RangeValueKind) -> Result<RangeValue> {
        let populated = self.populated();
        if populated != [kind] {
            return Err(SegmentError::Storage(format!(
                "row of kind {} has populated range columns {:?}",
                kind, populated
            )));
        }
        match kind {
            RangeValueKind::Integer => {
                let (lower, upper) = bounds(self.int4, kind)?;
                RangeValue::new(kind, lower, upper)
            }
            RangeValueKind::BigInteger => {
                let (lower, upper) = bounds(self.int8, kind)?;
                RangeValue::new(kind, lower, upper)
            }
            RangeValueKind::Decimal => {
                let (lower, upper) = bounds(self.num, kind)?;
                RangeValue::new(kind, lower, upper)
            }
            RangeValueKind::Date => {
                let (lower, upper) = bounds(self.date, kind)?;
                RangeValue::new(kind, lower, upper)
            }
            RangeValueKind::Timestamp => {
                let (lower, upper) = bounds(self.tstz, kind)?;
                RangeValue::new(kind, lower, upper)
            }
        }
    }
}

fn half_open<T>(lower: T, upper: T) -> PgRange<T> {
    PgRange {
        start: Bound::Included(lower),
        end: Bound::Excluded(upper),
    }
}

fn narrow(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        SegmentError::invalid_boundary(format!("{} does not fit an int4range bound", value))
    })
}

fn bounds<T>(column: Option<PgRange<T>>, kind: RangeValueKind) -> Result<(T, T)> {
    let range = column.ok_or_else(|| {
        SegmentError::Storage(format!("{} column is empty", kind.postgres_type()))
    })?;
    match (range.start, range.end) {
        (Bound::Included(lower), Bound::Excluded(upper)) => Ok((lower, upper)),
        _ => Err(SegmentError::Storage(format!(
            "stored {} is not a bounded half-open range",
            kind.postgres_type()
        ))),
    }
}
