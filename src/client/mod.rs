//! The `client` module provides a small async client for the broker's wire protocol.
//!
//! It is what the end-to-end tests drive the server with, and it is usable by
//! applications that want to publish or consume without hand-writing frames.

pub mod broker_client;
pub use broker_client::{BrokerClient, ClientError};
