// Background ingest worker: follower → channel → IngestLoop → MetricsAggregator.
// Also logs ingest totals periodically and stops on the shutdown signal.

use crate::follower::{self, LogFollower};
use crate::ingest::IngestLoop;
use crate::metrics::MetricsAggregator;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Follower, aggregator and shutdown for the worker.
pub struct WorkerDeps {
    pub follower: LogFollower,
    pub aggregator: Arc<MetricsAggregator>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Worker tuning and logging config.
pub struct WorkerConfig {
    /// Trace every parsed/rejected line at DEBUG.
    pub debug_parse: bool,
    /// Lines buffered between the follower and the parser.
    pub channel_capacity: usize,
    /// How often to log ingest totals (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Spawns the follower and the ingest loop. The returned handle completes on
/// shutdown or when the line stream ends.
pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> JoinHandle<()> {
    let WorkerDeps {
        follower,
        aggregator,
        shutdown_rx,
    } = deps;
    let WorkerConfig {
        debug_parse,
        channel_capacity,
        stats_log_interval_secs,
    } = config;

    let (line_tx, line_rx) = mpsc::channel(channel_capacity);
    let path = follower.path().display().to_string();
    let follower_handle = follower.spawn(line_tx);
    let ingest = IngestLoop::new(aggregator.clone(), debug_parse);

    let worker_span = tracing::span!(tracing::Level::DEBUG, "ingest", path = %path);
    tokio::spawn(
        run(
            ingest,
            line_rx,
            aggregator,
            shutdown_rx,
            follower_handle,
            stats_log_interval_secs,
        )
        .instrument(worker_span),
    )
}

async fn run(
    ingest: IngestLoop,
    line_rx: mpsc::Receiver<String>,
    aggregator: Arc<MetricsAggregator>,
    mut shutdown_rx: oneshot::Receiver<()>,
    follower_handle: JoinHandle<()>,
    stats_log_interval_secs: u64,
) {
    let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
    stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let lines = ingest.run(follower::lines(line_rx));
    tokio::pin!(lines);

    loop {
        tokio::select! {
            stats = &mut lines => {
                tracing::warn!(
                    accepted = stats.accepted,
                    rejected = stats.rejected,
                    "log line stream ended"
                );
                break;
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Worker shutting down");
                break;
            }
            _ = stats_log_tick.tick() => {
                tracing::info!(
                    lines_accepted_total = aggregator.lines_accepted(),
                    lines_rejected_total = aggregator.lines_rejected(),
                    "ingest stats"
                );
            }
        }
    }
    follower_handle.abort();
}
