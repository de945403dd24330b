// Tests covering span-level operations: boundary moves, append, delete cascades and validation.
mod common;

use chrono::{Duration, NaiveDate};
use common::{
    active_ranges, assert_partition_invariants, engine_for, int, integer_engine, span_with_segments,
};
use segline::prelude::*;
use segline::Placement;
use serde_json::Map;

#[tokio::test]
async fn gapless_span_starts_with_a_covering_segment() {
    let (engine, recorder) = integer_engine(|span| span.allow_span_gaps(false));
    let span = engine.create_span("rota", int(0, 10), Map::new()).await.unwrap();

    assert_eq!(active_ranges(&engine, span.id).await, vec![int(0, 10)]);
    assert_eq!(
        recorder.names(),
        vec![
            "span.pre_create",
            "span.post_create",
            "segment.pre_create",
            "segment.post_create",
        ]
    );
}

#[tokio::test]
async fn unknown_span_types_are_misconfigured() {
    let (engine, recorder) = integer_engine(|span| span);
    let err = engine.create_span("ledger", int(0, 10), Map::new()).await.unwrap_err();
    assert!(matches!(err, SegmentError::Misconfigured(_)));
    assert!(recorder.events().is_empty());

    let err = engine
        .create_span("rota", RangeValue::big_integer(0, 10).unwrap(), Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::TypeMismatch { .. }));
}

#[tokio::test]
async fn extend_covers_values_and_ranges() {
    let (engine, recorder) = integer_engine(|span| span);
    let span = engine.create_span("rota", int(5, 10), Map::new()).await.unwrap();
    recorder.clear();

    engine.extend_span(span.id, BoundValue::from(7)).await.unwrap();
    assert!(recorder.events().is_empty());

    let extended = engine.extend_span(span.id, int(0, 3)).await.unwrap();
    assert_eq!(extended.current_range, int(0, 10));
    let extended = engine.extend_span(span.id, BoundValue::from(14)).await.unwrap();
    assert_eq!(extended.current_range, int(0, 14));
    assert_eq!(extended.initial_range, int(5, 10));
    assert_eq!(recorder.names().len(), 4);
}

#[tokio::test]
async fn moving_the_lower_bound_inward_drops_and_clips_segments() {
    let (engine, _) = integer_engine(|span| span);
    let (span, segments) = span_with_segments(
        &engine,
        "rota",
        int(0, 12),
        &[int(0, 4), int(4, 8), int(8, 12)],
    )
    .await;

    let moved = engine
        .shift_span_boundary(span.id, Boundary::Lower, BoundaryMove::to(5))
        .await
        .unwrap();

    assert_eq!(moved.current_range, int(5, 12));
    assert!(engine.get_segment(segments[0].id).await.unwrap().is_deleted());
    assert_eq!(active_ranges(&engine, span.id).await, vec![int(5, 8), int(8, 12)]);
    let head = engine.first_segment(span.id).await.unwrap().unwrap();
    assert_eq!(head.id, segments[1].id);
    assert_eq!(head.previous_segment_id, None);
    assert_partition_invariants(&engine, span.id).await;
}

#[tokio::test]
async fn moving_the_upper_bound_of_a_gapless_span_drags_the_edge_segment() {
    let (engine, _) = integer_engine(|span| span.allow_span_gaps(false));
    let span = engine.create_span("rota", int(0, 10), Map::new()).await.unwrap();

    engine
        .shift_span_boundary(span.id, Boundary::Upper, BoundaryMove::by(5))
        .await
        .unwrap();
    assert_eq!(active_ranges(&engine, span.id).await, vec![int(0, 15)]);
    assert_partition_invariants(&engine, span.id).await;

    engine
        .shift_span_boundary(span.id, Boundary::Upper, BoundaryMove::to(6))
        .await
        .unwrap();
    assert_eq!(active_ranges(&engine, span.id).await, vec![int(0, 6)]);
    assert_eq!(engine.get_span(span.id).await.unwrap().current_range, int(0, 6));
    assert_partition_invariants(&engine, span.id).await;
}

#[tokio::test]
async fn span_bounds_cannot_cross() {
    let (engine, _) = integer_engine(|span| span);
    let span = engine.create_span("rota", int(0, 12), Map::new()).await.unwrap();

    let err = engine
        .shift_span_boundary(span.id, Boundary::Lower, BoundaryMove::to(12))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::InvalidBoundary(_)));

    let err = engine
        .shift_span_boundary(span.id, Boundary::Upper, BoundaryMove::by(-20))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::InvalidBoundary(_)));
    assert_eq!(engine.get_span(span.id).await.unwrap().current_range, int(0, 12));
}

#[tokio::test]
async fn append_chains_after_the_last_segment() {
    let (engine, _) = integer_engine(|span| span);
    let span = engine.create_span("rota", int(0, 10), Map::new()).await.unwrap();

    let first = engine
        .append_segment(span.id, None, Some(DeltaValue::from(5)), Map::new())
        .await
        .unwrap();
    assert_eq!(first.segment_range, int(0, 15));
    assert_eq!(first.previous_segment_id, None);

    let second = engine
        .append_segment(span.id, Some(BoundValue::from(20)), None, Map::new())
        .await
        .unwrap();
    assert_eq!(second.segment_range, int(15, 20));
    assert_eq!(second.previous_segment_id, Some(first.id));
    assert_eq!(engine.get_span(span.id).await.unwrap().current_range, int(0, 20));

    let err = engine
        .append_segment(span.id, Some(BoundValue::from(18)), None, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::InvalidBoundary(_)));
    assert_partition_invariants(&engine, span.id).await;
}

#[tokio::test]
async fn append_needs_exactly_one_target() {
    let (engine, _) = integer_engine(|span| span);
    let span = engine.create_span("rota", int(0, 10), Map::new()).await.unwrap();

    let neither = engine.append_segment(span.id, None, None, Map::new()).await;
    assert!(matches!(neither, Err(SegmentError::InvalidArgument(_))));

    let both = engine
        .append_segment(
            span.id,
            Some(BoundValue::from(12)),
            Some(DeltaValue::from(2)),
            Map::new(),
        )
        .await;
    assert!(matches!(both, Err(SegmentError::InvalidArgument(_))));
    assert_eq!(engine.segment_count(span.id).await.unwrap(), 0);
}

#[tokio::test]
async fn hard_delete_removes_rows_with_events_per_segment() {
    let (engine, recorder) = integer_engine(|span| span.soft_delete(false));
    let (span, _) = span_with_segments(&engine, "rota", int(0, 4), &[int(0, 4)]).await;
    recorder.clear();

    engine.delete_span(span.id).await.unwrap();

    assert!(matches!(
        engine.get_span(span.id).await,
        Err(SegmentError::SpanNotFound(_))
    ));
    assert!(engine.repository().segment_rows(span.id).await.is_empty());
    assert_eq!(
        recorder.names(),
        vec![
            "span.pre_delete_or_soft_delete",
            "span.pre_delete",
            "segment.pre_delete_or_soft_delete",
            "segment.pre_delete",
            "segment.post_delete",
            "segment.post_delete_or_soft_delete",
            "span.post_delete",
            "span.post_delete_or_soft_delete",
        ]
    );
}

#[tokio::test]
async fn soft_delete_cascades_through_segment_deletes() {
    let (engine, recorder) = integer_engine(|span| span);
    let (span, _) = span_with_segments(&engine, "rota", int(0, 4), &[int(0, 4)]).await;
    recorder.clear();

    engine.delete_span(span.id).await.unwrap();

    assert_eq!(
        recorder.names(),
        vec![
            "span.pre_delete_or_soft_delete",
            "span.pre_soft_delete",
            "segment.pre_delete_or_soft_delete",
            "segment.pre_soft_delete",
            "segment.post_soft_delete",
            "segment.post_delete_or_soft_delete",
            "span.post_soft_delete",
            "span.post_delete_or_soft_delete",
        ]
    );
    assert_eq!(
        engine.segments(span.id, SegmentStatus::Inactive).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn validation_reports_gaps_between_segments() {
    let (engine, _) = integer_engine(|span| span.allow_segment_gaps(false));
    let (span, segments) = span_with_segments(
        &engine,
        "rota",
        int(0, 12),
        &[int(0, 4), int(4, 8), int(8, 12)],
    )
    .await;
    engine.validate_span(span.id).await.unwrap();

    engine.delete_segment(segments[1].id).await.unwrap();

    let err = engine.validate_span(span.id).await.unwrap_err();
    assert!(matches!(err, SegmentError::InvalidBoundary(_)));
}

#[tokio::test]
async fn derived_lookups_follow_sort_order() {
    let (engine, _) = integer_engine(|span| span);
    let (span, segments) = span_with_segments(
        &engine,
        "rota",
        int(0, 12),
        &[int(8, 12), int(0, 4), int(4, 8)],
    )
    .await;
    let (last, first, middle) = (&segments[0], &segments[1], &segments[2]);

    assert_eq!(engine.first_segment(span.id).await.unwrap().map(|s| s.id), Some(first.id));
    assert_eq!(engine.last_segment(span.id).await.unwrap().map(|s| s.id), Some(last.id));
    assert_eq!(engine.previous_segment(middle.id).await.unwrap().map(|s| s.id), Some(first.id));
    assert_eq!(engine.next_segment(middle.id).await.unwrap().map(|s| s.id), Some(last.id));
    assert!(engine.next_segment(last.id).await.unwrap().is_none());

    let placement = engine.placement(middle.id).await.unwrap();
    assert_eq!(placement, Placement { position: Some(1), count: 3 });
    assert!(placement.is_internal());
    assert!(engine.placement(first.id).await.unwrap().is_first());
    assert!(engine.placement(last.id).await.unwrap().is_last());
}

#[tokio::test]
async fn date_spans_shift_by_whole_days() {
    let (engine, _) = engine_for(
        SpanModel::new("booking").range_value_type(RangeValueKind::Date),
        SegmentModel::new("night"),
    );
    let day = |d: u32| NaiveDate::from_ymd_opt(2024, 7, d).unwrap();
    let span = engine
        .create_span("booking", RangeValue::date(day(1), day(8)).unwrap(), Map::new())
        .await
        .unwrap();
    engine
        .create_segment(span.id, RangeValue::date(day(1), day(4)).unwrap(), Map::new())
        .await
        .unwrap();

    engine
        .shift_span(span.id, Duration::days(2) + Duration::hours(5))
        .await
        .unwrap();

    assert_eq!(
        engine.get_span(span.id).await.unwrap().current_range,
        RangeValue::date(day(3), day(10)).unwrap()
    );
    assert_eq!(
        active_ranges(&engine, span.id).await,
        vec![RangeValue::date(day(3), day(6)).unwrap()]
    );

    let err = engine.shift_span(span.id, 2).await.unwrap_err();
    assert!(matches!(err, SegmentError::TypeMismatch { .. }));
}

fn cascading_engine(span_soft_delete: bool) -> (common::TestEngine, segline::RecordingNotifier) {
    engine_for(
        SpanModel::new("rota")
            .range_value_type(RangeValueKind::Integer)
            .soft_delete(span_soft_delete),
        SegmentModel::new("rota_segment")
            .soft_delete(false)
            .previous_on_delete(PreviousOnDelete::Cascade),
    )
}

#[tokio::test]
async fn boundary_move_tolerates_segments_removed_by_a_cascade() {
    let (engine, _) = cascading_engine(false);
    let (span, segments) = span_with_segments(
        &engine,
        "rota",
        int(0, 12),
        &[int(0, 4), int(4, 8), int(8, 12)],
    )
    .await;

    let moved = engine
        .shift_span_boundary(span.id, Boundary::Upper, BoundaryMove::to(3))
        .await
        .unwrap();

    assert_eq!(moved.current_range, int(0, 3));
    assert_eq!(active_ranges(&engine, span.id).await, vec![int(0, 3)]);
    let rows = engine.repository().segment_rows(span.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, segments[0].id);
    assert_partition_invariants(&engine, span.id).await;
}

#[tokio::test]
async fn soft_span_delete_tolerates_segments_removed_by_a_cascade() {
    let (engine, recorder) = cascading_engine(true);
    let (span, _) = span_with_segments(
        &engine,
        "rota",
        int(0, 12),
        &[int(0, 4), int(4, 8), int(8, 12)],
    )
    .await;
    recorder.clear();

    engine.delete_span(span.id).await.unwrap();

    let stored = engine.repository().span_row(span.id).await.expect("span row kept");
    assert!(stored.deleted_at.is_some());
    assert!(engine.repository().segment_rows(span.id).await.is_empty());
    let deletes = recorder
        .names()
        .into_iter()
        .filter(|name| name == "segment.post_delete")
        .count();
    assert_eq!(deletes, 3);
}
