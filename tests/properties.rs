// Tests covering partition invariants across operation sequences and the shift/split inverses.
mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{
    active_ranges, assert_partition_invariants, engine_for, fields, int, integer_engine,
    span_with_segments,
};
use segline::prelude::*;
use serde_json::{json, Map};

#[tokio::test]
async fn invariants_hold_after_every_step() {
    let (engine, _) = integer_engine(|span| span.allow_segment_gaps(false));
    let (span, segments) = span_with_segments(&engine, "rota", int(0, 10), &[int(0, 10)]).await;
    assert_partition_invariants(&engine, span.id).await;

    let middle = engine.split_segment(segments[0].id, 4, &[]).await.unwrap();
    assert_partition_invariants(&engine, span.id).await;

    let last = engine.split_segment(middle.id, 7, &[]).await.unwrap();
    assert_partition_invariants(&engine, span.id).await;

    engine
        .shift_span_boundary(span.id, Boundary::Upper, BoundaryMove::by(5))
        .await
        .unwrap();
    assert_partition_invariants(&engine, span.id).await;

    let appended = engine
        .append_segment(span.id, Some(BoundValue::from(20)), None, Map::new())
        .await
        .unwrap();
    assert_eq!(appended.previous_segment_id, Some(last.id));
    assert_partition_invariants(&engine, span.id).await;

    engine.merge_segment_into_lower(last.id).await.unwrap();
    assert_partition_invariants(&engine, span.id).await;

    engine
        .shift_span_boundary(span.id, Boundary::Lower, BoundaryMove::to(5))
        .await
        .unwrap();
    assert_partition_invariants(&engine, span.id).await;

    assert_eq!(active_ranges(&engine, span.id).await, vec![int(5, 10), int(10, 20)]);
}

#[tokio::test]
async fn segments_created_out_of_order_are_chained_by_sort_order() {
    let (engine, _) = integer_engine(|span| span);
    let (span, segments) = span_with_segments(
        &engine,
        "rota",
        int(0, 30),
        &[int(20, 30), int(0, 10), int(10, 20)],
    )
    .await;

    let chain = engine.chain(span.id).await.unwrap();
    let order: Vec<_> = chain.segments().iter().map(|segment| segment.id).collect();
    assert_eq!(order, vec![segments[1].id, segments[2].id, segments[0].id]);
    assert_partition_invariants(&engine, span.id).await;
    assert_eq!(
        engine.check_and_fix_relationships(span.id).await.unwrap(),
        RepairOutcome::Valid
    );
}

#[tokio::test]
async fn shifting_a_span_back_restores_every_range() {
    let (engine, _) = engine_for(
        SpanModel::new("shift").range_value_type(RangeValueKind::Timestamp),
        SegmentModel::new("shift_part"),
    );
    let at = |hour: u32| Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap();
    let span = engine
        .create_span("shift", RangeValue::timestamp(at(6), at(18)).unwrap(), Map::new())
        .await
        .unwrap();
    for (lower, upper) in [(6, 9), (9, 14), (15, 18)] {
        engine
            .create_segment(span.id, RangeValue::timestamp(at(lower), at(upper)).unwrap(), Map::new())
            .await
            .unwrap();
    }
    let before = active_ranges(&engine, span.id).await;

    engine.shift_span(span.id, Duration::minutes(90)).await.unwrap();
    let moved = engine.get_span(span.id).await.unwrap();
    assert_eq!(moved.current_range.lower(), BoundValue::from(at(6) + Duration::minutes(90)));
    assert_eq!(moved.initial_range, span.initial_range);

    engine.shift_span(span.id, -Duration::minutes(90)).await.unwrap();

    assert_eq!(engine.get_span(span.id).await.unwrap().current_range, span.current_range);
    assert_eq!(active_ranges(&engine, span.id).await, before);
}

#[tokio::test]
async fn merging_a_split_restores_the_original_range() {
    let (engine, _) = integer_engine(|span| span);
    let (span, segments) = span_with_segments(&engine, "rota", int(0, 10), &[int(0, 10)]).await;
    let original = segments[0].clone();

    engine
        .split_segment(original.id, 6, &["label"])
        .await
        .unwrap();
    let merged = engine.merge_segment_into_upper(original.id).await.unwrap();

    assert_eq!(merged.segment_range, original.segment_range);
    assert_eq!(engine.segment_count(span.id).await.unwrap(), 1);
    assert_partition_invariants(&engine, span.id).await;
}

#[tokio::test]
async fn decimal_partitions_shift_with_decimal_deltas() {
    use rust_decimal::Decimal;

    let (engine, _) = engine_for(
        SpanModel::new("rate_band").range_value_type(RangeValueKind::Decimal),
        SegmentModel::new("rate_step"),
    );
    let dec = |units: i64| Decimal::new(units, 2);
    let span = engine
        .create_span("rate_band", RangeValue::decimal(dec(0), dec(500)).unwrap(), Map::new())
        .await
        .unwrap();
    let step = engine
        .create_segment(
            span.id,
            RangeValue::decimal(dec(150), dec(275)).unwrap(),
            fields(json!({"rate": "0.15"})),
        )
        .await
        .unwrap();

    let moved = engine.shift_segment(step.id, dec(300)).await.unwrap();
    assert_eq!(moved.segment_range, RangeValue::decimal(dec(450), dec(575)).unwrap());
    assert_eq!(
        engine.get_span(span.id).await.unwrap().current_range,
        RangeValue::decimal(dec(0), dec(575)).unwrap()
    );

    let err = engine.shift_segment(step.id, 3).await.unwrap_err();
    assert!(matches!(err, SegmentError::TypeMismatch { .. }));
    assert_partition_invariants(&engine, span.id).await;
}
