//! Message definitions for the broker
//!
//! `Message` is both the in-memory queue entry and the persisted record of an
//! outstanding message. Notes on fields:
//! - `topic`, `id`: the (topic, id) pair is unique among outstanding messages
//! - `seq`: monotonic sequence assigned by the durable log; recovery orders by it
//! - `published_at`: milliseconds since UNIX epoch when the publish was accepted
//! - `payload`: every publish-frame field other than `tag` and `msg_mark`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub id: String,
    pub seq: u64,
    pub published_at: i64,
    pub payload: Payload,
}

impl Message {
    pub fn new(topic: impl Into<String>, id: impl Into<String>, seq: u64, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            seq,
            published_at: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }
}
