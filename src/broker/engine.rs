//! Topic table
//!
//! The synchronous core of the topic store: a map from topic name to its
//! `TopicQueue`. It is owned by exactly one task (see `store`), so every
//! operation here is atomic with respect to every other one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::broker::message::Message;
use crate::broker::topic::TopicQueue;

#[derive(Debug, Default)]
pub struct TopicTable {
    topics: HashMap<String, TopicQueue>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, topic: &str) -> &mut TopicQueue {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicQueue::new(topic))
    }

    pub fn reserve(&mut self, topic: &str, id: &str) -> bool {
        self.queue_mut(topic).reserve(id)
    }

    pub fn release(&mut self, topic: &str, id: &str) -> bool {
        self.topics
            .get_mut(topic)
            .is_some_and(|queue| queue.release(id))
    }

    /// Appends to the topic's queue, creating it on first use.
    pub fn enqueue(&mut self, message: Arc<Message>) -> bool {
        let topic = message.topic.clone();
        self.queue_mut(&topic).push_back(message)
    }

    /// Pops the head of the first non-empty queue among `topics`, in the given order.
    pub fn try_dequeue(&mut self, topics: &[String]) -> Option<Arc<Message>> {
        topics.iter().find_map(|topic| {
            self.topics
                .get_mut(topic)
                .and_then(|queue| queue.pop_front())
        })
    }

    pub fn requeue(&mut self, topic: &str, id: &str) -> bool {
        self.topics
            .get_mut(topic)
            .is_some_and(|queue| queue.requeue(id))
    }

    pub fn ack(&mut self, topic: &str, id: &str) -> bool {
        self.topics
            .get_mut(topic)
            .is_some_and(|queue| queue.ack(id))
    }

    pub fn topic(&self, topic: &str) -> Option<&TopicQueue> {
        self.topics.get(topic)
    }

    pub fn pending_len(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, TopicQueue::pending_len)
    }

    pub fn total_pending(&self) -> usize {
        self.topics.values().map(TopicQueue::pending_len).sum()
    }
}
