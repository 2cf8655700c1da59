// Package metadata baked in at build time

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Startup banner, e.g. "Starting phpfpm-log-exporter version 0.2.0".
pub fn banner() -> String {
    format!("Starting {NAME} version {VERSION}")
}
