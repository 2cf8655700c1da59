// php-fpm access-log line parser.
//
// Expected shape after normalization (8 space-separated tokens):
//   <time> <id> <cpu%> <memory> <duration> <status> <method> <uri>

use crate::models::{LogRecord, Method, RejectReason};
use std::borrow::Cow;

/// Number of tokens a well-formed line splits into.
pub const FIELD_COUNT: usize = 8;

const CPU_FIELD: usize = 2;
const MEMORY_FIELD: usize = 3;
const DURATION_FIELD: usize = 4;
const STATUS_FIELD: usize = 5;
const METHOD_FIELD: usize = 6;

/// Strips `"` and collapses runs of spaces into one. Idempotent.
pub fn normalize(raw: &str) -> Cow<'_, str> {
    if !raw.contains('"') && !raw.contains("  ") {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut prev_space = false;
    for c in raw.chars().filter(|&c| c != '"') {
        if c == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Parses one raw log line. Malformed lines are routine, so rejection is a
/// plain `Err` carrying the first field that failed.
pub fn parse(raw: &str) -> Result<LogRecord, RejectReason> {
    let line = normalize(raw);
    let fields: Vec<&str> = line.split(' ').collect();
    let [_, _, cpu, memory, duration, status, method, _] = fields[..] else {
        return Err(RejectReason::WrongFieldCount {
            found: fields.len(),
        });
    };

    if !is_cpu(cpu) {
        return Err(RejectReason::Cpu);
    }
    let cpu_percent = to_f64(cpu.trim_end_matches('%'));

    if !is_digits(memory) {
        return Err(RejectReason::Memory);
    }
    let memory_bytes = to_f64(memory);

    if !is_decimal(duration) {
        return Err(RejectReason::Duration);
    }
    let duration_seconds = to_f64(duration);

    if !is_status_code(status) {
        return Err(RejectReason::StatusCode);
    }

    let method = Method::from_token(method).ok_or(RejectReason::Method)?;

    Ok(LogRecord {
        cpu_percent,
        memory_bytes,
        duration_seconds,
        status_code: status.to_owned(),
        method,
    })
}

/// Field indices, exposed so callers can point at the offending token.
pub fn field_index(reason: &RejectReason) -> Option<usize> {
    match reason {
        RejectReason::WrongFieldCount { .. } => None,
        RejectReason::Cpu => Some(CPU_FIELD),
        RejectReason::Memory => Some(MEMORY_FIELD),
        RejectReason::Duration => Some(DURATION_FIELD),
        RejectReason::StatusCode => Some(STATUS_FIELD),
        RejectReason::Method => Some(METHOD_FIELD),
    }
}

/// A value that matched its pattern but does not convert (`.` or an empty
/// string) counts as 0.
fn to_f64(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

/// `^\d*$`
fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// `^\d*\.\d*$`
fn is_decimal(s: &str) -> bool {
    match s.split_once('.') {
        Some((int, frac)) => is_digits(int) && is_digits(frac),
        None => false,
    }
}

/// `^\d*\.\d*%$`
fn is_cpu(s: &str) -> bool {
    s.strip_suffix('%').is_some_and(is_decimal)
}

/// `^[2345]\d\d$`
fn is_status_code(s: &str) -> bool {
    matches!(s.as_bytes(), [b'2'..=b'5', a, b] if a.is_ascii_digit() && b.is_ascii_digit())
}
