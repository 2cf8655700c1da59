// Feeds log lines through the parser into the metrics aggregator.

use crate::metrics::MetricsAggregator;
use crate::models::RejectReason;
use crate::parser;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;

/// Lines handled by one `IngestLoop::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct IngestLoop {
    aggregator: Arc<MetricsAggregator>,
    diagnostics: bool,
}

impl IngestLoop {
    /// `diagnostics` traces every line (accepted or rejected) at debug level.
    pub fn new(aggregator: Arc<MetricsAggregator>, diagnostics: bool) -> Self {
        Self {
            aggregator,
            diagnostics,
        }
    }

    /// Parse one line and record it. A rejected line is counted and otherwise dropped.
    pub fn process(&self, line: &str) -> Result<(), RejectReason> {
        match parser::parse(line) {
            Ok(record) => {
                if self.diagnostics {
                    tracing::debug!(
                        cpu = record.cpu_percent,
                        memory = record.memory_bytes,
                        duration = record.duration_seconds,
                        code = %record.status_code,
                        method = %record.method,
                        "Parsed string from log"
                    );
                }
                self.aggregator.observe(&record);
                Ok(())
            }
            Err(reason) => {
                self.aggregator.reject(&reason);
                if self.diagnostics {
                    tracing::debug!(
                        reason = %reason,
                        field = ?parser::field_index(&reason),
                        line,
                        "can't parse string from log"
                    );
                }
                Err(reason)
            }
        }
    }

    /// Consume `lines` until the stream ends.
    pub async fn run<S>(&self, lines: S) -> IngestStats
    where
        S: Stream<Item = String>,
    {
        let mut stats = IngestStats::default();
        let mut lines = std::pin::pin!(lines);
        while let Some(line) = lines.next().await {
            match self.process(&line) {
                Ok(()) => stats.accepted += 1,
                Err(_) => stats.rejected += 1,
            }
        }
        stats
    }
}
