use std::sync::Arc;

use parking_lot::Mutex;
use segline_core::errors::Result;
use segline_core::logging::EVENTS_TARGET;
use segline_protocol::event::{EntityKind, EventPayload, LifecycleEvent, Stage};
use tracing::debug;

/// Receives lifecycle events fired around every stored mutation.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &LifecycleEvent, payload: &EventPayload);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: &LifecycleEvent, payload: &EventPayload) {
        (**self).notify(event, payload)
    }
}

/// Forwards lifecycle events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &LifecycleEvent, payload: &EventPayload) {
        debug!(
            target: EVENTS_TARGET,
            event = %event,
            entity_id = ?payload.entity_id(),
            "lifecycle event"
        );
    }
}

/// Keeps every event in the order it was fired.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    records: Arc<Mutex<Vec<(LifecycleEvent, EventPayload)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.records.lock().iter().map(|(event, _)| *event).collect()
    }

    /// Dotted event names, e.g. `segment.post_create`.
    pub fn names(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(event, _)| event.name())
            .collect()
    }

    pub fn records(&self) -> Vec<(LifecycleEvent, EventPayload)> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &LifecycleEvent, payload: &EventPayload) {
        self.records.lock().push((*event, payload.clone()));
    }
}

/// Kind of stored mutation a [`SignalScope`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Create,
    Update,
    Delete,
    SoftDelete,
}

impl Mutation {
    fn pre_stages(&self) -> &'static [Stage] {
        match self {
            Mutation::Create => &[Stage::PreCreate],
            Mutation::Update => &[Stage::PreUpdate],
            Mutation::Delete => &[Stage::PreDeleteOrSoftDelete, Stage::PreDelete],
            Mutation::SoftDelete => &[Stage::PreDeleteOrSoftDelete, Stage::PreSoftDelete],
        }
    }

    fn post_stages(&self) -> &'static [Stage] {
        match self {
            Mutation::Create => &[Stage::PostCreate],
            Mutation::Update => &[Stage::PostUpdate],
            Mutation::Delete => &[Stage::PostDelete, Stage::PostDeleteOrSoftDelete],
            Mutation::SoftDelete => &[Stage::PostSoftDelete, Stage::PostDeleteOrSoftDelete],
        }
    }

    fn failed_stage(&self) -> Stage {
        match self {
            Mutation::Create => Stage::CreateFailed,
            Mutation::Update => Stage::UpdateFailed,
            Mutation::Delete | Mutation::SoftDelete => Stage::DeleteFailed,
        }
    }
}

/// Brackets one mutation with its pre events and either its post events or
/// the matching `*_failed` event.
pub struct SignalScope<'a, N: Notifier + ?Sized> {
    notifier: &'a N,
    entity: EntityKind,
    mutation: Mutation,
    payload: EventPayload,
}

impl<'a, N: Notifier + ?Sized> SignalScope<'a, N> {
    /// Fires the pre events and opens the scope.
    pub fn enter(
        notifier: &'a N,
        entity: EntityKind,
        mutation: Mutation,
        payload: EventPayload,
    ) -> Self {
        for stage in mutation.pre_stages() {
            notifier.notify(&LifecycleEvent::new(entity, *stage), &payload);
        }
        Self {
            notifier,
            entity,
            mutation,
            payload,
        }
    }

    /// Fires the post events built from the value, or the failed event with
    /// the pre payload. The result is returned unchanged.
    pub fn finish<T>(self, result: Result<T>, post: impl FnOnce(&T) -> EventPayload) -> Result<T> {
        match &result {
            Ok(value) => {
                let payload = post(value);
                for stage in self.mutation.post_stages() {
                    self.notifier
                        .notify(&LifecycleEvent::new(self.entity, *stage), &payload);
                }
            }
            Err(_) => {
                let event = LifecycleEvent::new(self.entity, self.mutation.failed_stage());
                self.notifier.notify(&event, &self.payload);
            }
        }
        result
    }
}
