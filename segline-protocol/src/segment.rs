use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::range::{BoundValue, RangeValue};

/// One sub-interval of a span's partition.
///
/// `previous_segment_id` is a cached link to the lower neighbour. The sort
/// order of `segment_range` is authoritative; relationship repair rebuilds
/// the link whenever the two disagree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: Uuid,
    pub span_id: Uuid,
    pub segment_range: RangeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_segment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn new(span_id: Uuid, segment_range: RangeValue) -> Self {
        SegmentBuilder::new(span_id, segment_range).build()
    }

    pub fn lower(&self) -> BoundValue {
        self.segment_range.lower()
    }

    pub fn upper(&self) -> BoundValue {
        self.segment_range.upper()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Copies the named fields that are present on this segment.
    pub fn copy_fields<S: AsRef<str>>(&self, names: &[S]) -> Map<String, Value> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.fields
                    .get(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect()
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    pub fn new(span_id: Uuid, segment_range: RangeValue) -> Self {
        let now = Utc::now();
        let segment = Segment {
            id: Uuid::new_v4(),
            span_id,
            segment_range,
            previous_segment_id: None,
            deleted_at: None,
            fields: Map::new(),
            created_at: now,
            updated_at: now,
        };

        Self { segment }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.segment.id = id;
        self
    }

    pub fn previous(mut self, previous: Option<Uuid>) -> Self {
        self.segment.previous_segment_id = previous;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.segment.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields(mut self, fields: Map<String, Value>) -> Self {
        self.segment.fields.extend(fields);
        self
    }

    pub fn build(self) -> Segment {
        self.segment
    }
}
