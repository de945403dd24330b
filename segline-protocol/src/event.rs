use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::range::RangeValue;
use crate::segment::Segment;
use crate::span::Span;

/// Entity a lifecycle event is about.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Span,
    Segment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Span => "span",
            EntityKind::Segment => "segment",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreCreate,
    PostCreate,
    CreateFailed,
    PreUpdate,
    PostUpdate,
    UpdateFailed,
    PreDelete,
    PreSoftDelete,
    PreDeleteOrSoftDelete,
    PostDelete,
    PostSoftDelete,
    PostDeleteOrSoftDelete,
    DeleteFailed,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::PreCreate,
        Stage::PostCreate,
        Stage::CreateFailed,
        Stage::PreUpdate,
        Stage::PostUpdate,
        Stage::UpdateFailed,
        Stage::PreDelete,
        Stage::PreSoftDelete,
        Stage::PreDeleteOrSoftDelete,
        Stage::PostDelete,
        Stage::PostSoftDelete,
        Stage::PostDeleteOrSoftDelete,
        Stage::DeleteFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreCreate => "pre_create",
            Stage::PostCreate => "post_create",
            Stage::CreateFailed => "create_failed",
            Stage::PreUpdate => "pre_update",
            Stage::PostUpdate => "post_update",
            Stage::UpdateFailed => "update_failed",
            Stage::PreDelete => "pre_delete",
            Stage::PreSoftDelete => "pre_soft_delete",
            Stage::PreDeleteOrSoftDelete => "pre_delete_or_soft_delete",
            Stage::PostDelete => "post_delete",
            Stage::PostSoftDelete => "post_soft_delete",
            Stage::PostDeleteOrSoftDelete => "post_delete_or_soft_delete",
            Stage::DeleteFailed => "delete_failed",
        }
    }
}

/// A named point in the life of a span or segment, e.g. `segment.post_soft_delete`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct LifecycleEvent {
    pub entity: EntityKind,
    pub stage: Stage,
}

impl LifecycleEvent {
    pub const fn new(entity: EntityKind, stage: Stage) -> Self {
        Self { entity, stage }
    }

    pub const fn span(stage: Stage) -> Self {
        Self::new(EntityKind::Span, stage)
    }

    pub const fn segment(stage: Stage) -> Self {
        Self::new(EntityKind::Segment, stage)
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity.as_str(), self.stage.as_str())
    }
}

/// Data handed to listeners along with an event.
///
/// `pre_create` carries the proposal, since nothing is stored yet.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    ProposedSpan {
        span_type: String,
        range: RangeValue,
    },
    ProposedSegment {
        span_id: Uuid,
        range: RangeValue,
    },
    Span(Span),
    Segment(Segment),
}

impl EventPayload {
    /// Id of the stored entity, if the payload carries one.
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            EventPayload::Span(span) => Some(span.id),
            EventPayload::Segment(segment) => Some(segment.id),
            EventPayload::ProposedSpan { .. } | EventPayload::ProposedSegment { .. } => None,
        }
    }
}
