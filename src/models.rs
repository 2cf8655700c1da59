// Parsed access-log record and line rejection reasons

use std::fmt;

/// HTTP methods counted by the exporter. Anything else rejects the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted access-log line. Only built when every field validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub cpu_percent: f64,
    pub memory_bytes: f64,
    pub duration_seconds: f64,
    /// Three digits, first one in 2..=5.
    pub status_code: String,
    pub method: Method,
}

/// Why a line was dropped. The first failing field wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("expected 8 fields, found {found}")]
    WrongFieldCount { found: usize },
    #[error("can't parse CPU")]
    Cpu,
    #[error("can't parse MEMORY")]
    Memory,
    #[error("can't parse DURATION")]
    Duration,
    #[error("can't parse CODE")]
    StatusCode,
    #[error("can't parse METHOD")]
    Method,
}

impl RejectReason {
    /// Every reason in label order; used to pre-seed rejection counters.
    pub const ALL_LABELS: [&'static str; 6] =
        ["field_count", "cpu", "memory", "duration", "code", "method"];

    /// Stable metric label for `phpfpm_log_lines_rejected_total{reason}`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WrongFieldCount { .. } => "field_count",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Duration => "duration",
            Self::StatusCode => "code",
            Self::Method => "method",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::WrongFieldCount { .. } => 0,
            Self::Cpu => 1,
            Self::Memory => 2,
            Self::Duration => 3,
            Self::StatusCode => 4,
            Self::Method => 5,
        }
    }
}
