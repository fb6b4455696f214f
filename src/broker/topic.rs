use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::broker::message::Message;

/// Where an outstanding id currently lives.
#[derive(Debug)]
enum Slot {
    /// A publish is persisting this id; not yet visible to consumers.
    Reserved,
    Queued,
    InFlight(Arc<Message>),
}

/// The pending messages of a single topic plus the bookkeeping for ids that
/// are outstanding but not queued.
///
/// Every outstanding id has exactly one `Slot`, so a message is either in
/// `pending` or in flight, never both.
#[derive(Debug, Default)]
pub struct TopicQueue {
    pub name: String,
    pending: VecDeque<Arc<Message>>,
    slots: HashMap<String, Slot>,
}

impl TopicQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Claims `id` for an upcoming publish. Returns false if it is already outstanding.
    pub fn reserve(&mut self, id: &str) -> bool {
        if self.slots.contains_key(id) {
            return false;
        }
        self.slots.insert(id.to_string(), Slot::Reserved);
        true
    }

    /// Drops a reservation that never turned into a message.
    pub fn release(&mut self, id: &str) -> bool {
        if matches!(self.slots.get(id), Some(Slot::Reserved)) {
            self.slots.remove(id);
            return true;
        }
        false
    }

    /// Appends a message. Returns false if its id is already queued or in flight.
    pub fn push_back(&mut self, message: Arc<Message>) -> bool {
        match self.slots.get(&message.id) {
            Some(Slot::Queued) | Some(Slot::InFlight(_)) => false,
            None | Some(Slot::Reserved) => {
                self.slots.insert(message.id.clone(), Slot::Queued);
                self.pending.push_back(message);
                true
            }
        }
    }

    /// Pops the head and marks it in flight.
    pub fn pop_front(&mut self) -> Option<Arc<Message>> {
        let message = self.pending.pop_front()?;
        self.slots
            .insert(message.id.clone(), Slot::InFlight(message.clone()));
        Some(message)
    }

    /// Puts an in-flight message back at the head of the queue.
    pub fn requeue(&mut self, id: &str) -> bool {
        match self.slots.remove(id) {
            Some(Slot::InFlight(message)) => {
                self.slots.insert(id.to_string(), Slot::Queued);
                self.pending.push_front(message);
                true
            }
            Some(other) => {
                self.slots.insert(id.to_string(), other);
                false
            }
            None => false,
        }
    }

    /// Forgets an in-flight message for good. Anything else is left untouched.
    pub fn ack(&mut self, id: &str) -> bool {
        if matches!(self.slots.get(id), Some(Slot::InFlight(_))) {
            self.slots.remove(id);
            return true;
        }
        false
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::InFlight(_)))
            .count()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        matches!(self.slots.get(id), Some(Slot::InFlight(_)))
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|m| m.id.clone()).collect()
    }
}
