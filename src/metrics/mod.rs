// Request metrics aggregated from parsed access-log lines.
// The ingest task writes via `observe`/`reject`; HTTP handlers read via `render`.

pub mod summary;

use crate::models::{LogRecord, Method, RejectReason};
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub use summary::{QUANTILES, QuantileValue, Summary, SummarySnapshot};

/// Content type of `render` output.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// CPU percent kept to 0.001%.
const CPU_SCALE: f64 = 1_000.0;
/// Memory kept to the byte.
const MEMORY_SCALE: f64 = 1.0;
/// Duration kept to the microsecond.
const DURATION_SCALE: f64 = 1_000_000.0;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("histogram creation: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Process-lifetime aggregate of every accepted line. Never reset.
pub struct MetricsAggregator {
    registry: Registry,
    cpu: Summary,
    memory: Summary,
    duration: Summary,
    requests: IntCounterVec,
    lines_accepted: IntCounter,
    lines_rejected: IntCounterVec,
}

#[derive(Debug, Clone)]
pub struct RequestCount {
    pub code: String,
    pub method: Method,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct RejectedCount {
    pub reason: &'static str,
    pub count: u64,
}

/// Read-only copy of the aggregate. Each summary is internally consistent;
/// nothing is promised across summaries.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub cpu: SummarySnapshot,
    pub memory: SummarySnapshot,
    pub duration: SummarySnapshot,
    /// Sorted by (code, method).
    pub requests: Vec<RequestCount>,
    pub lines_accepted: u64,
    pub lines_rejected: Vec<RejectedCount>,
}

impl MetricsAggregator {
    /// Build every metric and register it with a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let cpu = Summary::new("phpfpm_requests_cpu", "Summary requests cpu use.", CPU_SCALE)?;
        let memory = Summary::new(
            "phpfpm_requests_memory",
            "Summary requests memory use.",
            MEMORY_SCALE,
        )?;
        let duration = Summary::new(
            "phpfpm_requests_duration",
            "Summary requests duration.",
            DURATION_SCALE,
        )?;

        // Cardinality: codes 200-599 x 2 methods, created on first observation.
        let requests = IntCounterVec::new(
            Opts::new(
                "phpfpm_requests_total",
                "How many HTTP requests processed, partitioned by status code and HTTP method.",
            ),
            &["code", "method"],
        )?;
        let lines_accepted = IntCounter::new(
            "phpfpm_log_lines_accepted_total",
            "How many access log lines were parsed and counted.",
        )?;
        let lines_rejected = IntCounterVec::new(
            Opts::new(
                "phpfpm_log_lines_rejected_total",
                "How many access log lines were dropped, partitioned by the first field that failed.",
            ),
            &["reason"],
        )?;
        for reason in RejectReason::ALL_LABELS {
            lines_rejected.with_label_values(&[reason]);
        }

        registry.register(Box::new(cpu.clone()))?;
        registry.register(Box::new(memory.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(lines_accepted.clone()))?;
        registry.register(Box::new(lines_rejected.clone()))?;

        Ok(Self {
            registry,
            cpu,
            memory,
            duration,
            requests,
            lines_accepted,
            lines_rejected,
        })
    }

    /// Record one accepted line in all three summaries and the request counter.
    pub fn observe(&self, record: &LogRecord) {
        self.cpu.observe(record.cpu_percent);
        self.memory.observe(record.memory_bytes);
        self.duration.observe(record.duration_seconds);
        self.requests
            .with_label_values(&[record.status_code.as_str(), record.method.as_str()])
            .inc();
        self.lines_accepted.inc();
    }

    /// Count a dropped line under its reason label.
    pub fn reject(&self, reason: &RejectReason) {
        self.lines_rejected.with_label_values(&[reason.label()]).inc();
    }

    pub fn lines_accepted(&self) -> u64 {
        self.lines_accepted.get()
    }

    pub fn lines_rejected(&self) -> u64 {
        self.rejected_counts().iter().map(|r| r.count).sum()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cpu: self.cpu.snapshot(),
            memory: self.memory.snapshot(),
            duration: self.duration.snapshot(),
            requests: self.request_counts(),
            lines_accepted: self.lines_accepted(),
            lines_rejected: self.rejected_counts(),
        }
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Read back the request counter without creating new label children.
    fn request_counts(&self) -> Vec<RequestCount> {
        let mut counts: Vec<RequestCount> = self
            .requests
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .filter_map(|metric| {
                let mut code = None;
                let mut method = None;
                for pair in metric.get_label() {
                    match pair.get_name() {
                        "code" => code = Some(pair.get_value().to_string()),
                        "method" => method = Method::from_token(pair.get_value()),
                        _ => {}
                    }
                }
                Some(RequestCount {
                    code: code?,
                    method: method?,
                    count: metric.get_counter().get_value() as u64,
                })
            })
            .collect();
        counts.sort_by(|a, b| (&a.code, a.method).cmp(&(&b.code, b.method)));
        counts
    }

    /// Every reason label was created in `new`, so lookups never add series.
    fn rejected_counts(&self) -> Vec<RejectedCount> {
        RejectReason::ALL_LABELS
            .iter()
            .map(|&reason| RejectedCount {
                reason,
                count: self.lines_rejected.with_label_values(&[reason]).get(),
            })
            .collect()
    }
}
