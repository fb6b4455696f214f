//! The `persistence` module keeps every outstanding message on disk so that it
//! survives a crash or restart.
//!
//! Layout: one root directory, one subdirectory per topic, one file per
//! outstanding message named by its id and holding the JSON-encoded record.

pub mod file_log;

pub use file_log::{DurableLog, LogScan, validate_component};

#[cfg(test)]
mod tests;
