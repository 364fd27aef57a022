//! Event notifications produced by the core.
//!
//! Delivery is fire-and-forget: the core never retries, and a sink must not
//! block the caller for long since it runs on camera and ticker threads.
//! Person events are sent outside the gallery lock, so updates of one person
//! may arrive out of order; `Person::visit_count` orders them.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::occupancy::Violation;
use crate::reid::Person;

#[derive(Debug, Clone)]
pub enum Event {
    Violation(Violation),
    PersonCreated(Person),
    PersonUpdated(Person),
}

pub trait EventSink: Send + Sync {
    fn on_violation(&self, _violation: &Violation) {}

    fn on_person_created(&self, _person: &Person) {}

    fn on_person_updated(&self, _person: &Person) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Writes events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_violation(&self, violation: &Violation) {
        tracing::warn!(
            room = %violation.room_id,
            count = violation.count,
            "occupancy violation"
        );
    }

    fn on_person_created(&self, person: &Person) {
        tracing::info!(person = %person.person_id, label = %person.label, "person created");
    }

    fn on_person_updated(&self, person: &Person) {
        tracing::debug!(
            person = %person.person_id,
            visits = person.visit_count,
            "person updated"
        );
    }
}

/// Forwards events over a channel to a consumer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }

    /// Sink backed by an unbounded channel.
    pub fn unbounded() -> (Self, Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    /// Sink backed by a bounded channel; events are dropped while it is full.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    fn send(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::warn!("event channel full, dropping event"),
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("event receiver gone, dropping event")
            }
        }
    }
}

impl EventSink for ChannelSink {
    fn on_violation(&self, violation: &Violation) {
        self.send(Event::Violation(violation.clone()));
    }

    fn on_person_created(&self, person: &Person) {
        self.send(Event::PersonCreated(person.clone()));
    }

    fn on_person_updated(&self, person: &Person) {
        self.send(Event::PersonUpdated(person.clone()));
    }
}
