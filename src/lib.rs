//! # PopQueue
//!
//! `popqueue` is a single-node, durable, topic-addressed message queue server.
//! Producers publish JSON messages over TCP, consumers pull them one at a time and
//! acknowledge them, and every message that has not been acknowledged survives a restart.
//!
//! ## Core Modules
//!
//! - `broker`: messages, per-topic queues, the shared topic store and startup recovery.
//! - `client`: a small async client speaking the wire protocol.
//! - `config`: loading and merging server configuration.
//! - `persistence`: the on-disk log of outstanding messages.
//! - `transport`: frame codec, per-connection sessions and the TCP server.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
