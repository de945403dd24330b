use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use segline_core::errors::{Result, SegmentError};
use serde::{Deserialize, Serialize};

/// Domain of a range column. Each kind maps to one native PostgreSQL range type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RangeValueKind {
    Integer,
    BigInteger,
    Decimal,
    Date,
    Timestamp,
}

/// Scalar carried by the bounds of a range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Decimal,
    Date,
    Timestamp,
}

/// Scalar accepted when shifting a range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Int,
    Decimal,
    Duration,
}

impl RangeValueKind {
    pub const ALL: [RangeValueKind; 5] = [
        RangeValueKind::Integer,
        RangeValueKind::BigInteger,
        RangeValueKind::Decimal,
        RangeValueKind::Date,
        RangeValueKind::Timestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeValueKind::Integer => "integer",
            RangeValueKind::BigInteger => "big_integer",
            RangeValueKind::Decimal => "decimal",
            RangeValueKind::Date => "date",
            RangeValueKind::Timestamp => "timestamp",
        }
    }

    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            RangeValueKind::Integer | RangeValueKind::BigInteger => ScalarKind::Int,
            RangeValueKind::Decimal => ScalarKind::Decimal,
            RangeValueKind::Date => ScalarKind::Date,
            RangeValueKind::Timestamp => ScalarKind::Timestamp,
        }
    }

    pub fn delta_kind(&self) -> DeltaKind {
        match self {
            RangeValueKind::Integer | RangeValueKind::BigInteger => DeltaKind::Int,
            RangeValueKind::Decimal => DeltaKind::Decimal,
            RangeValueKind::Date | RangeValueKind::Timestamp => DeltaKind::Duration,
        }
    }

    /// Name of the matching PostgreSQL range type.
    pub fn postgres_type(&self) -> &'static str {
        match self {
            RangeValueKind::Integer => "int4range",
            RangeValueKind::BigInteger => "int8range",
            RangeValueKind::Decimal => "numrange",
            RangeValueKind::Date => "daterange",
            RangeValueKind::Timestamp => "tstzrange",
        }
    }

    /// Checks that a bound belongs to this domain.
    pub fn check_value(&self, value: &BoundValue) -> Result<()> {
        if value.scalar_kind() != self.scalar_kind() {
            return Err(SegmentError::type_mismatch(
                format!("{} bound", self),
                format!("{:?} value {}", value.scalar_kind(), value),
            ));
        }
        if let (RangeValueKind::Integer, BoundValue::Int(v)) = (self, value) {
            if i32::try_from(*v).is_err() {
                return Err(SegmentError::invalid_boundary(format!(
                    "{} does not fit a 32-bit integer range",
                    v
                )));
            }
        }
        Ok(())
    }

    /// Checks that a delta can shift bounds of this domain.
    pub fn check_delta(&self, delta: &DeltaValue) -> Result<()> {
        if delta.kind() != self.delta_kind() {
            return Err(SegmentError::type_mismatch(
                format!("{:?} delta for {} range", self.delta_kind(), self),
                format!("{:?} delta {}", delta.kind(), delta),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RangeValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeValueKind {
    type Err = SegmentError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "integer" | "int" | "int4range" => Ok(RangeValueKind::Integer),
            "big_integer" | "biginteger" | "bigint" | "int8range" => Ok(RangeValueKind::BigInteger),
            "decimal" | "numeric" | "numrange" => Ok(RangeValueKind::Decimal),
            "date" | "daterange" => Ok(RangeValueKind::Date),
            "timestamp" | "datetime" | "tstzrange" => Ok(RangeValueKind::Timestamp),
            other => Err(SegmentError::misconfigured(format!(
                "unknown range value type '{}'",
                other
            ))),
        }
    }
}

/// One bound of a range.
///
/// Ordering compares the variant first, so only bounds of the same scalar
/// kind are meaningfully ordered. Ranges never mix kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BoundValue {
    Int(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl BoundValue {
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            BoundValue::Int(_) => ScalarKind::Int,
            BoundValue::Decimal(_) => ScalarKind::Decimal,
            BoundValue::Date(_) => ScalarKind::Date,
            BoundValue::Timestamp(_) => ScalarKind::Timestamp,
        }
    }

    /// Adds a delta, failing on kind mismatch or when the result leaves the domain.
    pub fn checked_add(&self, delta: &DeltaValue) -> Result<BoundValue> {
        let shifted = match (self, delta) {
            (BoundValue::Int(v), DeltaValue::Int(d)) => v.checked_add(*d).map(BoundValue::Int),
            (BoundValue::Decimal(v), DeltaValue::Decimal(d)) => {
                v.checked_add(*d).map(BoundValue::Decimal)
            }
            // whole days only
            (BoundValue::Date(v), DeltaValue::Duration(d)) => {
                v.checked_add_signed(*d).map(BoundValue::Date)
            }
            (BoundValue::Timestamp(v), DeltaValue::Duration(d)) => {
                v.checked_add_signed(*d).map(BoundValue::Timestamp)
            }
            _ => {
                return Err(SegmentError::type_mismatch(
                    format!("delta for {:?} bound", self.scalar_kind()),
                    format!("{:?} delta", delta.kind()),
                ))
            }
        };

        shifted.ok_or_else(|| {
            SegmentError::invalid_boundary(format!("{} shifted by {} overflows", self, delta))
        })
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Int(v) => write!(f, "{}", v),
            BoundValue::Decimal(v) => write!(f, "{}", v),
            BoundValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            BoundValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        BoundValue::Int(value)
    }
}

impl From<i32> for BoundValue {
    fn from(value: i32) -> Self {
        BoundValue::Int(value as i64)
    }
}

impl From<Decimal> for BoundValue {
    fn from(value: Decimal) -> Self {
        BoundValue::Decimal(value)
    }
}

impl From<NaiveDate> for BoundValue {
    fn from(value: NaiveDate) -> Self {
        BoundValue::Date(value)
    }
}

impl From<DateTime<Utc>> for BoundValue {
    fn from(value: DateTime<Utc>) -> Self {
        BoundValue::Timestamp(value)
    }
}

/// Amount a bound is moved by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaValue {
    Int(i64),
    Decimal(Decimal),
    Duration(Duration),
}

impl DeltaValue {
    pub fn kind(&self) -> DeltaKind {
        match self {
            DeltaValue::Int(_) => DeltaKind::Int,
            DeltaValue::Decimal(_) => DeltaKind::Decimal,
            DeltaValue::Duration(_) => DeltaKind::Duration,
        }
    }

    /// The opposite delta. Fails for `i64::MIN`, which has no positive counterpart.
    pub fn checked_neg(&self) -> Result<DeltaValue> {
        let negated = match self {
            DeltaValue::Int(v) => v.checked_neg().map(DeltaValue::Int),
            DeltaValue::Decimal(v) => Some(DeltaValue::Decimal(-*v)),
            DeltaValue::Duration(v) => Duration::zero().checked_sub(v).map(DeltaValue::Duration),
        };
        negated.ok_or_else(|| SegmentError::invalid_boundary(format!("delta {} cannot be negated", self)))
    }
}

impl fmt::Display for DeltaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaValue::Int(v) => write!(f, "{}", v),
            DeltaValue::Decimal(v) => write!(f, "{}", v),
            DeltaValue::Duration(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for DeltaValue {
    fn from(value: i64) -> Self {
        DeltaValue::Int(value)
    }
}

impl From<i32> for DeltaValue {
    fn from(value: i32) -> Self {
        DeltaValue::Int(value as i64)
    }
}

impl From<Decimal> for DeltaValue {
    fn from(value: Decimal) -> Self {
        DeltaValue::Decimal(value)
    }
}

impl From<Duration> for DeltaValue {
    fn from(value: Duration) -> Self {
        DeltaValue::Duration(value)
    }
}

/// Immutable half-open interval `[lower, upper)` over one scalar domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct RangeValue {
    kind: RangeValueKind,
    lower: BoundValue,
    upper: BoundValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RangeRepr {
    kind: RangeValueKind,
    lower: BoundValue,
    upper: BoundValue,
}

impl TryFrom<RangeRepr> for RangeValue {
    type Error = SegmentError;

    fn try_from(repr: RangeRepr) -> Result<Self> {
        RangeValue::new(repr.kind, repr.lower, repr.upper)
    }
}

impl From<RangeValue> for RangeRepr {
    fn from(range: RangeValue) -> Self {
        RangeRepr {
            kind: range.kind,
            lower: range.lower,
            upper: range.upper,
        }
    }
}

impl RangeValue {
    pub fn new(
        kind: RangeValueKind,
        lower: impl Into<BoundValue>,
        upper: impl Into<BoundValue>,
    ) -> Result<Self> {
        let lower = lower.into();
        let upper = upper.into();
        kind.check_value(&lower)?;
        kind.check_value(&upper)?;
        if lower >= upper {
            return Err(SegmentError::invalid_boundary(format!(
                "lower bound {} must be below upper bound {}",
                lower, upper
            )));
        }
        Ok(Self { kind, lower, upper })
    }

    pub fn integer(lower: i32, upper: i32) -> Result<Self> {
        Self::new(RangeValueKind::Integer, lower, upper)
    }

    pub fn big_integer(lower: i64, upper: i64) -> Result<Self> {
        Self::new(RangeValueKind::BigInteger, lower, upper)
    }

    pub fn decimal(lower: Decimal, upper: Decimal) -> Result<Self> {
        Self::new(RangeValueKind::Decimal, lower, upper)
    }

    pub fn date(lower: NaiveDate, upper: NaiveDate) -> Result<Self> {
        Self::new(RangeValueKind::Date, lower, upper)
    }

    pub fn timestamp(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Result<Self> {
        Self::new(RangeValueKind::Timestamp, lower, upper)
    }

    pub fn kind(&self) -> RangeValueKind {
        self.kind
    }

    pub fn lower(&self) -> BoundValue {
        self.lower
    }

    pub fn upper(&self) -> BoundValue {
        self.upper
    }

    /// `lower <= value < upper`.
    pub fn contains_value(&self, value: &BoundValue) -> bool {
        self.lower <= *value && *value < self.upper
    }

    pub fn contains_range(&self, other: &RangeValue) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }

    pub fn overlaps(&self, other: &RangeValue) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }

    pub fn is_adjacent_to(&self, other: &RangeValue) -> bool {
        self.upper == other.lower || other.upper == self.lower
    }

    pub fn with_lower(&self, lower: impl Into<BoundValue>) -> Result<Self> {
        Self::new(self.kind, lower, self.upper)
    }

    pub fn with_upper(&self, upper: impl Into<BoundValue>) -> Result<Self> {
        Self::new(self.kind, self.lower, upper)
    }

    /// Moves both bounds by the same delta.
    pub fn shifted(&self, delta: &DeltaValue) -> Result<Self> {
        self.kind.check_delta(delta)?;
        let lower = self.lower.checked_add(delta)?;
        let upper = self.upper.checked_add(delta)?;
        Self::new(self.kind, lower, upper)
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test_case(0, 4, 3, 5, true ; "crossing")]
    #[test_case(0, 4, 4, 8, false ; "touching")]
    #[test_case(0, 4, 1, 2, true ; "nested")]
    #[test_case(5, 9, 0, 4, false ; "disjoint")]
    fn detects_overlap(a: i32, b: i32, c: i32, d: i32, expected: bool) {
        let left = RangeValue::integer(a, b).unwrap();
        let right = RangeValue::integer(c, d).unwrap();
        assert_eq!(left.overlaps(&right), expected);
        assert_eq!(right.overlaps(&left), expected);
    }

    #[test]
    fn negating_the_smallest_integer_delta_fails() {
        assert_eq!(DeltaValue::Int(5).checked_neg().unwrap(), DeltaValue::Int(-5));
        assert_eq!(
            DeltaValue::Int(i64::MAX).checked_neg().unwrap(),
            DeltaValue::Int(-i64::MAX)
        );
        assert!(matches!(
            DeltaValue::Int(i64::MIN).checked_neg(),
            Err(SegmentError::InvalidBoundary(_))
        ));
        assert_eq!(
            DeltaValue::Duration(Duration::hours(2)).checked_neg().unwrap(),
            DeltaValue::Duration(Duration::hours(-2))
        );
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        assert!(matches!(
            RangeValue::integer(4, 4),
            Err(SegmentError::InvalidBoundary(_))
        ));
        assert!(matches!(
            RangeValue::integer(5, 1),
            Err(SegmentError::InvalidBoundary(_))
        ));
    }

    #[test]
    fn rejects_foreign_scalars() {
        let err = RangeValue::new(RangeValueKind::Date, 1i64, 3i64).unwrap_err();
        assert!(matches!(err, SegmentError::TypeMismatch { .. }));
    }

    #[test]
    fn integer_ranges_stay_within_32_bits() {
        let err =
            RangeValue::new(RangeValueKind::Integer, 0i64, i64::from(i32::MAX) + 1).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidBoundary(_)));
        assert!(RangeValue::big_integer(0, i64::from(i32::MAX) + 1).is_ok());
    }

    #[test]
    fn half_open_containment() {
        let range = RangeValue::integer(0, 4).unwrap();
        assert!(range.contains_value(&BoundValue::Int(0)));
        assert!(!range.contains_value(&BoundValue::Int(4)));
        assert!(range.contains_range(&RangeValue::integer(0, 4).unwrap()));
        assert!(!range.contains_range(&RangeValue::integer(2, 5).unwrap()));
        assert!(range.is_adjacent_to(&RangeValue::integer(4, 6).unwrap()));
    }

    #[test]
    fn shifts_dates_by_whole_days() {
        let range = RangeValue::date(date(2024, 1, 1), date(2024, 1, 10)).unwrap();
        let shifted = range
            .shifted(&DeltaValue::Duration(Duration::hours(50)))
            .unwrap();
        assert_eq!(shifted.lower(), BoundValue::Date(date(2024, 1, 3)));
        assert_eq!(shifted.upper(), BoundValue::Date(date(2024, 1, 12)));
    }

    #[test]
    fn shifts_timestamps_and_decimals() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let range = RangeValue::timestamp(start, start + Duration::hours(2)).unwrap();
        let shifted = range.shifted(&Duration::minutes(30).into()).unwrap();
        assert_eq!(shifted.lower(), BoundValue::Timestamp(start + Duration::minutes(30)));

        let range = RangeValue::decimal(Decimal::new(15, 1), Decimal::new(30, 1)).unwrap();
        let shifted = range.shifted(&DeltaValue::Decimal(Decimal::new(-5, 1))).unwrap();
        assert_eq!(shifted.lower(), BoundValue::Decimal(Decimal::new(10, 1)));
    }

    #[test]
    fn shift_rejects_wrong_delta_and_overflow() {
        let range = RangeValue::big_integer(0, 10).unwrap();
        assert!(matches!(
            range.shifted(&DeltaValue::Duration(Duration::days(1))),
            Err(SegmentError::TypeMismatch { .. })
        ));
        assert!(matches!(
            range.shifted(&DeltaValue::Int(i64::MAX)),
            Err(SegmentError::InvalidBoundary(_))
        ));
        let small = RangeValue::integer(0, 10).unwrap();
        assert!(matches!(
            small.shifted(&DeltaValue::Int(i64::from(i32::MAX))),
            Err(SegmentError::InvalidBoundary(_))
        ));
    }

    #[test]
    fn kind_names_round_trip_through_parse() {
        for kind in RangeValueKind::ALL {
            assert_eq!(kind.as_str().parse::<RangeValueKind>().unwrap(), kind);
            assert_eq!(kind.postgres_type().parse::<RangeValueKind>().unwrap(), kind);
        }
        assert!(matches!(
            "float".parse::<RangeValueKind>(),
            Err(SegmentError::Misconfigured(_))
        ));
    }

    #[test]
    fn deserialization_enforces_ordering() {
        let json = serde_json::json!({
            "kind": "integer",
            "lower": { "type": "int", "value": 8 },
            "upper": { "type": "int", "value": 2 },
        });
        assert!(serde_json::from_value::<RangeValue>(json).is_err());

        let range = RangeValue::integer(2, 8).unwrap();
        let encoded = serde_json::to_value(range).unwrap();
        assert_eq!(serde_json::from_value::<RangeValue>(encoded).unwrap(), range);
    }
}
