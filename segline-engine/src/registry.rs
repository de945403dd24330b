//! Span and segment model declarations and their resolved configuration.

use std::collections::HashMap;

use segline_core::config::{PreviousOnDelete, SegmentSettings};
use segline_core::errors::{Result, SegmentError};
use segline_protocol::range::RangeValueKind;
use serde::Serialize;

/// Declaration of a concrete span type. Unset flags fall back to the global settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanModel {
    pub name: String,
    pub range_value_type: Option<RangeValueKind>,
    pub allow_span_gaps: Option<bool>,
    pub allow_segment_gaps: Option<bool>,
    pub soft_delete: Option<bool>,
}

impl SpanModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range_value_type: None,
            allow_span_gaps: None,
            allow_segment_gaps: None,
            soft_delete: None,
        }
    }

    pub fn range_value_type(mut self, kind: RangeValueKind) -> Self {
        self.range_value_type = Some(kind);
        self
    }

    pub fn allow_span_gaps(mut self, allow: bool) -> Self {
        self.allow_span_gaps = Some(allow);
        self
    }

    pub fn allow_segment_gaps(mut self, allow: bool) -> Self {
        self.allow_segment_gaps = Some(allow);
        self
    }

    pub fn soft_delete(mut self, soft_delete: bool) -> Self {
        self.soft_delete = Some(soft_delete);
        self
    }
}

/// Declaration of a concrete segment type bound to one span type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentModel {
    pub name: String,
    pub span_type: Option<String>,
    /// Overrides the span model's soft delete flag for segment deletes.
    pub soft_delete: Option<bool>,
    pub previous_on_delete: Option<PreviousOnDelete>,
}

impl SegmentModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span_type: None,
            soft_delete: None,
            previous_on_delete: None,
        }
    }

    pub fn span_type(mut self, span_type: impl Into<String>) -> Self {
        self.span_type = Some(span_type.into());
        self
    }

    pub fn soft_delete(mut self, soft_delete: bool) -> Self {
        self.soft_delete = Some(soft_delete);
        self
    }

    pub fn previous_on_delete(mut self, policy: PreviousOnDelete) -> Self {
        self.previous_on_delete = Some(policy);
        self
    }
}

/// Fully resolved configuration of a span type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanConfig {
    pub name: String,
    pub range_value_type: RangeValueKind,
    pub allow_span_gaps: bool,
    pub allow_segment_gaps: bool,
    pub soft_delete: bool,
}

/// Fully resolved configuration of a segment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentConfig {
    pub name: String,
    pub span_type: String,
    pub soft_delete: bool,
    #[serde(serialize_with = "serialize_policy")]
    pub previous_on_delete: PreviousOnDelete,
}

fn serialize_policy<S: serde::Serializer>(
    policy: &PreviousOnDelete,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(policy.as_str())
}

/// Resolved view of every registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryDescription {
    pub spans: Vec<SpanConfig>,
    pub segments: Vec<SegmentConfig>,
}

/// Source of per-type configuration for the engine.
pub trait ConfigProvider: Send + Sync {
    fn span_config(&self, span_type: &str) -> Result<SpanConfig>;

    fn segment_config(&self, segment_type: &str) -> Result<SegmentConfig>;

    /// Configuration of the segment type attached to `span_type`.
    fn segment_model_for_span(&self, span_type: &str) -> Result<SegmentConfig>;
}

/// Registry of span and segment models, validated as they are registered.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    settings: SegmentSettings,
    spans: HashMap<String, SpanModel>,
    segments: HashMap<String, SegmentModel>,
    segment_by_span: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new(settings: SegmentSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SegmentSettings {
        &self.settings
    }

    pub fn register_span(&mut self, model: SpanModel) -> Result<()> {
        if model.name.trim().is_empty() {
            return Err(SegmentError::misconfigured("span model name must not be empty"));
        }
        if model.range_value_type.is_none() {
            return Err(SegmentError::misconfigured(format!(
                "range value type not defined for span model '{}'",
                model.name
            )));
        }
        if self.spans.contains_key(&model.name) {
            return Err(SegmentError::misconfigured(format!(
                "span model '{}' is already registered",
                model.name
            )));
        }
        self.spans.insert(model.name.clone(), model);
        Ok(())
    }

    pub fn register_segment(&mut self, model: SegmentModel) -> Result<()> {
        if model.name.trim().is_empty() {
            return Err(SegmentError::misconfigured("segment model name must not be empty"));
        }
        let span_type = model.span_type.clone().ok_or_else(|| {
            SegmentError::misconfigured(format!(
                "span model not defined for segment model '{}'",
                model.name
            ))
        })?;
        if !self.spans.contains_key(&span_type) {
            return Err(SegmentError::misconfigured(format!(
                "segment model '{}' refers to unregistered span model '{}'",
                model.name, span_type
            )));
        }
        if self.segments.contains_key(&model.name) {
            return Err(SegmentError::misconfigured(format!(
                "segment model '{}' is already registered",
                model.name
            )));
        }
        if let Some(existing) = self.segment_by_span.get(&span_type) {
            return Err(SegmentError::misconfigured(format!(
                "span model '{}' already has segment model '{}'",
                span_type, existing
            )));
        }
        self.segment_by_span.insert(span_type, model.name.clone());
        self.segments.insert(model.name.clone(), model);
        Ok(())
    }

    /// Resolved configuration of every model, sorted by name.
    pub fn describe(&self) -> RegistryDescription {
        let mut spans: Vec<SpanConfig> = self
            .spans
            .values()
            .filter_map(|model| self.resolve_span(model).ok())
            .collect();
        spans.sort_by(|a, b| a.name.cmp(&b.name));

        let mut segments: Vec<SegmentConfig> = self
            .segments
            .values()
            .filter_map(|model| self.resolve_segment(model).ok())
            .collect();
        segments.sort_by(|a, b| a.name.cmp(&b.name));

        RegistryDescription { spans, segments }
    }

    fn resolve_span(&self, model: &SpanModel) -> Result<SpanConfig> {
        let range_value_type = model.range_value_type.ok_or_else(|| {
            SegmentError::misconfigured(format!(
                "range value type not defined for span model '{}'",
                model.name
            ))
        })?;
        Ok(SpanConfig {
            name: model.name.clone(),
            range_value_type,
            allow_span_gaps: model.allow_span_gaps.unwrap_or(self.settings.allow_span_gaps),
            allow_segment_gaps: model
                .allow_segment_gaps
                .unwrap_or(self.settings.allow_segment_gaps),
            soft_delete: model.soft_delete.unwrap_or(self.settings.soft_delete),
        })
    }

    fn resolve_segment(&self, model: &SegmentModel) -> Result<SegmentConfig> {
        let span_type = model.span_type.clone().ok_or_else(|| {
            SegmentError::misconfigured(format!(
                "span model not defined for segment model '{}'",
                model.name
            ))
        })?;
        let span = self.span_config(&span_type)?;
        Ok(SegmentConfig {
            name: model.name.clone(),
            span_type,
            soft_delete: model.soft_delete.unwrap_or(span.soft_delete),
            previous_on_delete: model
                .previous_on_delete
                .unwrap_or(self.settings.previous_on_delete),
        })
    }
}

impl ConfigProvider for ModelRegistry {
    fn span_config(&self, span_type: &str) -> Result<SpanConfig> {
        let model = self.spans.get(span_type).ok_or_else(|| {
            SegmentError::misconfigured(format!("span model '{}' is not registered", span_type))
        })?;
        self.resolve_span(model)
    }

    fn segment_config(&self, segment_type: &str) -> Result<SegmentConfig> {
        let model = self.segments.get(segment_type).ok_or_else(|| {
            SegmentError::misconfigured(format!(
                "segment model '{}' is not registered",
                segment_type
            ))
        })?;
        self.resolve_segment(model)
    }

    fn segment_model_for_span(&self, span_type: &str) -> Result<SegmentConfig> {
        let name = self.segment_by_span.get(span_type).ok_or_else(|| {
            SegmentError::misconfigured(format!(
                "no segment model registered for span model '{}'",
                span_type
            ))
        })?;
        self.segment_config(name)
    }
}
