//! Domain events published after successful registry mutations.

/// Events emitted by the drain registry. One event per committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    DrainAdded { drain_id: String },
    DrainUpdated { drain_id: String },
    DrainDeleted { drain_id: String },
    CleaningRecorded { drain_id: String, record_id: String },
    StateReplaced,
}

/// Sink for domain events. Publishing must never fail or block.
pub trait DomainEventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Sink that discards all events.
pub struct NoOpDomainEventSink;

impl DomainEventSink for NoOpDomainEventSink {
    fn publish(&self, _event: DomainEvent) {}
}
