// Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use segline::prelude::*;
use segline::RecordingNotifier;
use serde_json::{Map, Value};
use uuid::Uuid;

pub type TestEngine = SegmentEngine<MemoryRepository, RecordingNotifier>;

/// Engine over an in-memory repository with one span model and its
/// segment model (`<name>_segment`).
pub fn engine_for(span: SpanModel, segment: SegmentModel) -> (TestEngine, RecordingNotifier) {
    let mut registry = ModelRegistry::new(SegmentSettings::default());
    let span_name = span.name.clone();
    registry.register_span(span).expect("span model registers");
    registry
        .register_segment(segment.span_type(span_name))
        .expect("segment model registers");

    let recorder = RecordingNotifier::new();
    let engine = SegmentEngine::with_notifier(MemoryRepository::new(), recorder.clone(), Arc::new(registry));
    (engine, recorder)
}

pub fn integer_engine(configure: impl FnOnce(SpanModel) -> SpanModel) -> (TestEngine, RecordingNotifier) {
    engine_for(
        configure(SpanModel::new("rota").range_value_type(RangeValueKind::Integer)),
        SegmentModel::new("rota_segment"),
    )
}

pub fn int(lower: i32, upper: i32) -> RangeValue {
    RangeValue::integer(lower, upper).expect("valid integer range")
}

pub fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Creates a span and one segment per range, in the given order.
pub async fn span_with_segments(
    engine: &TestEngine,
    span_type: &str,
    span_range: RangeValue,
    segments: &[RangeValue],
) -> (Span, Vec<Segment>) {
    let span = engine
        .create_span(span_type, span_range, Map::new())
        .await
        .expect("span created");
    let mut created = Vec::new();
    for range in segments {
        created.push(
            engine
                .create_segment(span.id, *range, Map::new())
                .await
                .expect("segment created"),
        );
    }
    (span, created)
}

pub async fn active_ranges(engine: &TestEngine, span_id: Uuid) -> Vec<RangeValue> {
    engine
        .segments(span_id, SegmentStatus::Active)
        .await
        .expect("segments listed")
        .into_iter()
        .map(|segment| segment.segment_range)
        .collect()
}

/// Containment, no-overlap and chain order for the active segments of a span.
pub async fn assert_partition_invariants(engine: &TestEngine, span_id: Uuid) {
    let span = engine.get_span(span_id).await.expect("span exists");
    let chain = engine.chain(span_id).await.expect("chain loads");
    let segments = chain.segments();

    for segment in segments {
        assert!(
            span.current_range.contains_range(&segment.segment_range),
            "{} escapes span {}",
            segment.segment_range,
            span.current_range
        );
    }
    for pair in segments.windows(2) {
        assert!(
            !pair[0].segment_range.overlaps(&pair[1].segment_range),
            "{} overlaps {}",
            pair[0].segment_range,
            pair[1].segment_range
        );
    }

    // Following the links from the head must visit segments in sort order.
    let by_previous: HashMap<Option<Uuid>, Uuid> = segments
        .iter()
        .map(|segment| (segment.previous_segment_id, segment.id))
        .collect();
    assert_eq!(by_previous.len(), segments.len(), "two segments share a predecessor");
    let mut walked = Vec::new();
    let mut cursor = by_previous.get(&None).copied();
    while let Some(id) = cursor {
        walked.push(id);
        cursor = by_previous.get(&Some(id)).copied();
    }
    let sorted: Vec<Uuid> = segments.iter().map(|segment| segment.id).collect();
    assert_eq!(walked, sorted);

    engine.validate_span(span_id).await.expect("span validates");
}
