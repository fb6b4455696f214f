//! The `utils` module provides shared definitions used across the `popqueue` application:
//! the error taxonomy and the logging setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, FrameError, PersistenceError};

#[cfg(test)]
mod tests;
