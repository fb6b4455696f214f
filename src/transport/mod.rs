//! The `transport` module is responsible for network communication with clients.
//!
//! It defines the line-delimited JSON frames exchanged with clients, the
//! per-connection session state machine, and the TCP server that ties
//! sessions to the topic store and the durable log.

pub mod message;
pub mod server;
pub mod session;

pub use message::{ClientFrame, Delivery, ServerFrame};
pub use server::BrokerServer;

#[cfg(test)]
mod tests;
