//! Pure boundary arithmetic shared by the span and segment operations.

use std::fmt;

use segline_core::errors::{Result, SegmentError};
use segline_protocol::range::{BoundValue, DeltaValue, RangeValue};

/// Which end of a range an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Lower,
    Upper,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::Lower => "lower",
            Boundary::Upper => "upper",
        }
    }

    pub fn of(&self, range: &RangeValue) -> BoundValue {
        match self {
            Boundary::Lower => range.lower(),
            Boundary::Upper => range.upper(),
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of a boundary shift: an absolute value or a delta from the current bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMove {
    To(BoundValue),
    By(DeltaValue),
}

impl BoundaryMove {
    pub fn to(value: impl Into<BoundValue>) -> Self {
        BoundaryMove::To(value.into())
    }

    pub fn by(delta: impl Into<DeltaValue>) -> Self {
        BoundaryMove::By(delta.into())
    }
}

/// What a range gets extended to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Value(BoundValue),
    Range(RangeValue),
}

impl From<BoundValue> for Extent {
    fn from(value: BoundValue) -> Self {
        Extent::Value(value)
    }
}

impl From<RangeValue> for Extent {
    fn from(range: RangeValue) -> Self {
        Extent::Range(range)
    }
}

/// Resolves a move into the absolute value the bound would take.
pub fn resolve_move(range: &RangeValue, which: Boundary, movement: &BoundaryMove) -> Result<BoundValue> {
    let kind = range.kind();
    let value = match movement {
        BoundaryMove::To(value) => *value,
        BoundaryMove::By(delta) => {
            kind.check_delta(delta)?;
            which.of(range).checked_add(delta)?
        }
    };
    kind.check_value(&value)?;
    Ok(value)
}

/// Fails when `value` would meet or cross the bound opposite to `which`.
pub fn ensure_not_crossing(range: &RangeValue, which: Boundary, value: &BoundValue) -> Result<()> {
    let crosses = match which {
        Boundary::Lower => *value >= range.upper(),
        Boundary::Upper => *value <= range.lower(),
    };
    if crosses {
        let opposite = match which {
            Boundary::Lower => Boundary::Upper,
            Boundary::Upper => Boundary::Lower,
        };
        return Err(SegmentError::invalid_boundary(format!(
            "new {} bound {} crosses the {} bound of {}",
            which, value, opposite, range
        )));
    }
    Ok(())
}

/// Replaces one bound of `range`.
pub fn set_boundary(range: &RangeValue, value: BoundValue, which: Boundary) -> Result<RangeValue> {
    range.kind().check_value(&value)?;
    match which {
        Boundary::Lower => range.with_lower(value),
        Boundary::Upper => range.with_upper(value),
    }
}

/// Smallest range containing both `range` and `extent`.
pub fn extend(range: &RangeValue, extent: impl Into<Extent>) -> Result<RangeValue> {
    let (lower, upper) = match extent.into() {
        Extent::Value(value) => {
            range.kind().check_value(&value)?;
            (value, value)
        }
        Extent::Range(other) => {
            if other.kind() != range.kind() {
                return Err(SegmentError::type_mismatch(range.kind(), other.kind()));
            }
            (other.lower(), other.upper())
        }
    };
    RangeValue::new(
        range.kind(),
        range.lower().min(lower),
        range.upper().max(upper),
    )
}

pub fn shift(range: &RangeValue, delta: &DeltaValue) -> Result<RangeValue> {
    range.shifted(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;
    use test_case::test_case;

    fn int(lower: i32, upper: i32) -> RangeValue {
        RangeValue::integer(lower, upper).unwrap()
    }

    #[test_case(Boundary::Lower, 2, 2, 4 ; "raise lower")]
    #[test_case(Boundary::Lower, -3, -3, 4 ; "lower below zero")]
    #[test_case(Boundary::Upper, 9, 0, 9 ; "raise upper")]
    #[test_case(Boundary::Upper, 1, 0, 1 ; "shrink upper")]
    fn sets_a_single_boundary(which: Boundary, value: i64, lower: i32, upper: i32) {
        let updated = set_boundary(&int(0, 4), BoundValue::Int(value), which).unwrap();
        assert_eq!(updated, int(lower, upper));
    }

    #[test]
    fn set_boundary_rejects_inversion_and_foreign_types() {
        assert!(matches!(
            set_boundary(&int(0, 4), BoundValue::Int(4), Boundary::Lower),
            Err(SegmentError::InvalidBoundary(_))
        ));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(
            set_boundary(&int(0, 4), BoundValue::Date(date), Boundary::Upper),
            Err(SegmentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn extends_to_values_and_ranges() {
        assert_eq!(extend(&int(2, 4), BoundValue::Int(0)).unwrap(), int(0, 4));
        assert_eq!(extend(&int(2, 4), BoundValue::Int(7)).unwrap(), int(2, 7));
        assert_eq!(extend(&int(2, 4), BoundValue::Int(3)).unwrap(), int(2, 4));
        assert_eq!(extend(&int(2, 4), int(3, 10)).unwrap(), int(2, 10));

        let big = RangeValue::big_integer(0, 2).unwrap();
        assert!(matches!(
            extend(&int(2, 4), big),
            Err(SegmentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn resolves_moves_by_delta_and_by_value() {
        let range = RangeValue::decimal(Decimal::new(10, 1), Decimal::new(50, 1)).unwrap();
        let moved = resolve_move(
            &range,
            Boundary::Upper,
            &BoundaryMove::by(Decimal::new(25, 1)),
        )
        .unwrap();
        assert_eq!(moved, BoundValue::Decimal(Decimal::new(75, 1)));

        let moved = resolve_move(&range, Boundary::Lower, &BoundaryMove::to(Decimal::ZERO)).unwrap();
        assert_eq!(moved, BoundValue::Decimal(Decimal::ZERO));

        assert!(matches!(
            resolve_move(&range, Boundary::Lower, &BoundaryMove::by(Duration::days(1))),
            Err(SegmentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn detects_crossing_the_opposite_bound() {
        let range = int(0, 4);
        assert!(ensure_not_crossing(&range, Boundary::Lower, &BoundValue::Int(3)).is_ok());
        assert!(ensure_not_crossing(&range, Boundary::Lower, &BoundValue::Int(4)).is_err());
        assert!(ensure_not_crossing(&range, Boundary::Upper, &BoundValue::Int(0)).is_err());
        assert!(ensure_not_crossing(&range, Boundary::Upper, &BoundValue::Int(1)).is_ok());
    }

    #[test]
    fn shifting_is_reversible() {
        let range = int(0, 4);
        let there = shift(&range, &DeltaValue::Int(3)).unwrap();
        assert_eq!(there, int(3, 7));
        assert_eq!(shift(&there, &DeltaValue::Int(-3)).unwrap(), range);
    }
}
