use segline_core::errors::{Result, SegmentError};
use segline_protocol::span::Span;

use crate::chain::SegmentChain;
use crate::registry::SpanConfig;

/// Checks a span's active segments against its configuration.
///
/// Order: containment, span gaps, segment gaps, overlap. The first violation
/// found is returned.
pub fn validate_partition(span: &Span, chain: &SegmentChain, config: &SpanConfig) -> Result<()> {
    let span_range = span.current_range;
    let segments = chain.segments();

    for segment in segments {
        if !span_range.contains_range(&segment.segment_range) {
            return Err(SegmentError::OutOfSpanRange {
                range: segment.segment_range.to_string(),
                span_range: span_range.to_string(),
            });
        }
    }

    if !config.allow_span_gaps {
        if let (Some(first), Some(last)) = (chain.first(), chain.last()) {
            if first.lower() != span_range.lower() {
                return Err(SegmentError::invalid_boundary(format!(
                    "first segment {} does not start at the span's lower bound {}",
                    first.segment_range,
                    span_range.lower()
                )));
            }
            if last.upper() != span_range.upper() {
                return Err(SegmentError::invalid_boundary(format!(
                    "last segment {} does not end at the span's upper bound {}",
                    last.segment_range,
                    span_range.upper()
                )));
            }
        }
    }

    if !config.allow_segment_gaps {
        for pair in segments.windows(2) {
            if pair[0].upper() != pair[1].lower() {
                return Err(SegmentError::invalid_boundary(format!(
                    "segments {} and {} are not contiguous",
                    pair[0].segment_range, pair[1].segment_range
                )));
            }
        }
    }

    for pair in segments.windows(2) {
        if pair[0].segment_range.overlaps(&pair[1].segment_range) {
            return Err(SegmentError::Overlap {
                proposed: pair[1].segment_range.to_string(),
                existing: pair[0].segment_range.to_string(),
            });
        }
    }

    Ok(())
}
