//! Wire frames
//!
//! Every frame is one line of JSON. Client frames are told apart by shape:
//! - publish: an object with `tag` and `msg_mark`, remaining fields are the payload
//! - pull: an array of topic names in priority order
//! - delivery ack: an object with `ack_code` and `ack_mark`
//!
//! Server frames are the publish ack `{"msg_mark": id}`, a delivery (the payload
//! plus `tag` and `msg_mark`), the string `"none"` for an empty pull and
//! `{"error": text}`. Input is only ever parsed as data.

use serde_json::{Map, Value, json};

use crate::broker::message::{Message, Payload};
use crate::persistence::validate_component;
use crate::utils::error::FrameError;

pub const TOPIC_FIELD: &str = "tag";
pub const ID_FIELD: &str = "msg_mark";
pub const ACK_CODE_FIELD: &str = "ack_code";
pub const ACK_ID_FIELD: &str = "ack_mark";
pub const ERROR_FIELD: &str = "error";
pub const EMPTY_PULL: &str = "none";
pub const ACK_SUCCESS: &str = "200";

#[derive(Debug, Clone, PartialEq)]
pub struct PublishFrame {
    pub topic: String,
    pub id: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAckFrame {
    pub id: String,
    pub code: String,
}

impl DeliveryAckFrame {
    pub fn is_success(&self) -> bool {
        self.code == ACK_SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Publish(PublishFrame),
    Pull(Vec<String>),
    DeliveryAck(DeliveryAckFrame),
}

impl ClientFrame {
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(map) => decode_object(map),
            Value::Array(items) => decode_pull(items),
            other => Err(FrameError::ProtocolViolation(format!(
                "expected an object or an array, got {}",
                kind(&other)
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ClientFrame::Publish(frame) => {
                let mut map = frame.payload.clone();
                map.insert(TOPIC_FIELD.to_string(), Value::String(frame.topic.clone()));
                map.insert(ID_FIELD.to_string(), Value::String(frame.id.clone()));
                Value::Object(map).to_string()
            }
            ClientFrame::Pull(topics) => json!(topics).to_string(),
            ClientFrame::DeliveryAck(ack) => {
                json!({ ACK_CODE_FIELD: ack.code, ACK_ID_FIELD: ack.id }).to_string()
            }
        }
    }
}

fn decode_object(mut map: Map<String, Value>) -> Result<ClientFrame, FrameError> {
    if map.contains_key(TOPIC_FIELD) || map.contains_key(ID_FIELD) {
        let topic = take_name(&mut map, TOPIC_FIELD)?;
        let id = take_name(&mut map, ID_FIELD)?;
        return Ok(ClientFrame::Publish(PublishFrame {
            topic,
            id,
            payload: map,
        }));
    }

    if map.contains_key(ACK_CODE_FIELD) || map.contains_key(ACK_ID_FIELD) {
        let code = match map.remove(ACK_CODE_FIELD) {
            Some(Value::String(code)) => code,
            Some(Value::Number(code)) => code.to_string(),
            Some(other) => {
                return Err(invalid(ACK_CODE_FIELD, format!("expected a string, got {}", kind(&other))));
            }
            None => return Err(invalid(ACK_CODE_FIELD, "missing".to_string())),
        };
        let id = match map.remove(ACK_ID_FIELD) {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(invalid(ACK_ID_FIELD, format!("expected a string, got {}", kind(&other))));
            }
            None => return Err(invalid(ACK_ID_FIELD, "missing".to_string())),
        };
        return Ok(ClientFrame::DeliveryAck(DeliveryAckFrame { id, code }));
    }

    Err(FrameError::ProtocolViolation(
        "object is neither a publish nor a delivery ack".to_string(),
    ))
}

fn decode_pull(items: Vec<Value>) -> Result<ClientFrame, FrameError> {
    let mut topics = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(topic) => {
                validate_component(&topic).map_err(|reason| invalid("topic", reason))?;
                topics.push(topic);
            }
            other => {
                return Err(invalid("topic", format!("expected a string, got {}", kind(&other))));
            }
        }
    }
    Ok(ClientFrame::Pull(topics))
}

fn take_name(map: &mut Map<String, Value>, field: &'static str) -> Result<String, FrameError> {
    match map.remove(field) {
        Some(Value::String(name)) => {
            validate_component(&name).map_err(|reason| invalid(field, reason))?;
            Ok(name)
        }
        Some(other) => Err(invalid(field, format!("expected a string, got {}", kind(&other)))),
        None => Err(invalid(field, "missing".to_string())),
    }
}

fn invalid(field: &'static str, reason: String) -> FrameError {
    FrameError::InvalidField { field, reason }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A delivered message as the consumer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub id: String,
    pub payload: Payload,
}

impl From<&Message> for Delivery {
    fn from(message: &Message) -> Self {
        Self {
            topic: message.topic.clone(),
            id: message.id.clone(),
            payload: message.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    PublishAck { id: String },
    Delivery(Delivery),
    Empty,
    Error { message: String },
}

impl ServerFrame {
    pub fn error(err: impl std::fmt::Display) -> Self {
        ServerFrame::Error {
            message: err.to_string(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ServerFrame::PublishAck { id } => json!({ ID_FIELD: id }).to_string(),
            ServerFrame::Delivery(delivery) => {
                let mut map = delivery.payload.clone();
                map.insert(TOPIC_FIELD.to_string(), Value::String(delivery.topic.clone()));
                map.insert(ID_FIELD.to_string(), Value::String(delivery.id.clone()));
                Value::Object(map).to_string()
            }
            ServerFrame::Empty => Value::String(EMPTY_PULL.to_string()).to_string(),
            ServerFrame::Error { message } => json!({ ERROR_FIELD: message }).to_string(),
        }
    }

    /// Client-side decoding of a server line.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        match serde_json::from_str::<Value>(line)? {
            Value::String(text) if text == EMPTY_PULL => Ok(ServerFrame::Empty),
            Value::Object(mut map) => {
                if let Some(Value::String(message)) = map.get(ERROR_FIELD) {
                    if map.len() == 1 {
                        return Ok(ServerFrame::Error {
                            message: message.clone(),
                        });
                    }
                }
                if map.contains_key(TOPIC_FIELD) {
                    let topic = take_name(&mut map, TOPIC_FIELD)?;
                    let id = take_name(&mut map, ID_FIELD)?;
                    return Ok(ServerFrame::Delivery(Delivery {
                        topic,
                        id,
                        payload: map,
                    }));
                }
                if map.len() == 1 {
                    if let Some(Value::String(id)) = map.remove(ID_FIELD) {
                        return Ok(ServerFrame::PublishAck { id });
                    }
                }
                Err(FrameError::ProtocolViolation(
                    "unrecognized server object".to_string(),
                ))
            }
            other => Err(FrameError::ProtocolViolation(format!(
                "unexpected server frame: {}",
                kind(&other)
            ))),
        }
    }
}
