use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::range::RangeValue;

/// Parent interval owning an ordered partition of segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub id: Uuid,
    /// Name of the registered span model this record belongs to.
    pub span_type: String,
    /// Range at creation time. Never changed afterwards.
    pub initial_range: RangeValue,
    pub current_range: RangeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Span {
    pub fn new(span_type: impl Into<String>, range: RangeValue) -> Self {
        SpanBuilder::new(span_type, range).build()
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

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builder helper to create spans with extra fields.
pub struct SpanBuilder {
    span: Span,
}

impl SpanBuilder {
    pub fn new(span_type: impl Into<String>, range: RangeValue) -> Self {
        let now = Utc::now();
        let span = Span {
            id: Uuid::new_v4(),
            span_type: span_type.into(),
            initial_range: range,
            current_range: range,
            deleted_at: None,
            fields: Map::new(),
            created_at: now,
            updated_at: now,
        };

        Self { span }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.span.id = id;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.span.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields(mut self, fields: Map<String, Value>) -> Self {
        self.span.fields.extend(fields);
        self
    }

    pub fn build(self) -> Span {
        self.span
    }
}
