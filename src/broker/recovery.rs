//! Startup recovery
//!
//! Rebuilds the topic table from the durable log before the server accepts
//! connections. Records are enqueued in `seq` order so that publish order
//! survives a restart regardless of directory listing order.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::engine::TopicTable;
use crate::persistence::DurableLog;
use crate::utils::error::PersistenceError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub topics: usize,
    pub messages: usize,
    /// Records that could not be read; left on disk for the operator.
    pub skipped: usize,
    pub stale_temp_files: usize,
}

/// Load every persisted record under the log root into `table`.
pub fn recover(log: &DurableLog, table: &mut TopicTable) -> Result<RecoveryReport, PersistenceError> {
    let mut report = RecoveryReport::default();

    for topic in log.topics()? {
        report.stale_temp_files += log.remove_stale_temp(&topic)?;

        let mut records = Vec::new();
        for record in log.scan(&topic)? {
            match record {
                Ok((_, message)) => records.push(message),
                Err(e) => {
                    warn!(%topic, error = %e, "skipping unreadable record");
                    report.skipped += 1;
                }
            }
        }
        records.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.id.cmp(&b.id)));

        report.topics += 1;
        for message in records {
            log.observe_sequence(message.seq);
            if table.enqueue(Arc::new(message)) {
                report.messages += 1;
            }
        }
    }

    info!(
        topics = report.topics,
        messages = report.messages,
        skipped = report.skipped,
        stale_temp_files = report.stale_temp_files,
        "recovered durable log"
    );
    Ok(report)
}
