// Shared test helpers
#![allow(dead_code)]

use phpfpm_log_exporter::models::{LogRecord, Method};

/// A well-formed access log line with the given fields.
pub fn log_line(cpu: &str, memory: &str, duration: &str, code: &str, method: &str) -> String {
    format!("10:00:00 reqid {cpu} {memory} {duration} {code} {method} /index.php")
}

pub fn record(cpu: f64, memory: f64, duration: f64, code: &str, method: Method) -> LogRecord {
    LogRecord {
        cpu_percent: cpu,
        memory_bytes: memory,
        duration_seconds: duration,
        status_code: code.into(),
        method,
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}
