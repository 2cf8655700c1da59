use crate::follower::FollowerConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default config file, used when `CONFIG_FILE` is unset.
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `*` / `any` (all interfaces), `localhost`, or an IP address.
    pub listen_address: String,
    pub listen_port: u16,
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "*".into(),
            // Prometheus default port allocation for the php-fpm exporter.
            listen_port: 9253,
            metrics_path: "/metrics".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// php-fpm access log to follow.
    pub file: String,
    /// Trace every parsed and rejected line at DEBUG level.
    pub debug_parse: bool,
    /// Sleep between EOF checks for new data or rotation.
    pub poll_interval_ms: u64,
    /// Ingest existing file content on startup instead of only new lines.
    pub from_start: bool,
    /// Lines buffered between the follower and the parser.
    pub channel_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: "/var/log/php-fpm/www-access.log".into(),
            debug_parse: false,
            poll_interval_ms: 250,
            from_start: true,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How often to log ingest totals at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Resolve `listen_address` + `listen_port` into a bind address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip = match self.listen_address.as_str() {
            "*" | "any" | "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            other => other.parse::<IpAddr>().map_err(|e| {
                anyhow::anyhow!(
                    "server.listen_address must be '*', 'any', 'localhost' or an IP address, got {:?}: {}",
                    other,
                    e
                )
            })?,
        };
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

impl LogConfig {
    pub fn follower_config(&self) -> FollowerConfig {
        FollowerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            from_start: self.from_start,
        }
    }
}

impl AppConfig {
    /// Load from `CONFIG_FILE`, else `config.toml`. A missing default file
    /// means built-in defaults; a missing explicit file is an error.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_file(&path),
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_FILE)
            }
            Err(_) => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("config file {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.listen_port > 0,
            "server.listen_port must be between 1 and 65535, got {}",
            self.server.listen_port
        );
        self.server.socket_addr()?;
        anyhow::ensure!(
            self.server.metrics_path.starts_with('/'),
            "server.metrics_path must start with '/', got {:?}",
            self.server.metrics_path
        );
        anyhow::ensure!(
            self.server.metrics_path != "/" && self.server.metrics_path != "/version",
            "server.metrics_path must not shadow the '/' or '/version' routes, got {:?}",
            self.server.metrics_path
        );
        anyhow::ensure!(
            !self.server.metrics_path.contains([':', '*', '{', '}']),
            "server.metrics_path must be a literal path without ':', '*', '{{' or '}}', got {:?}",
            self.server.metrics_path
        );
        anyhow::ensure!(!self.log.file.is_empty(), "log.file must be non-empty");
        anyhow::ensure!(
            self.log.poll_interval_ms > 0,
            "log.poll_interval_ms must be > 0, got {}",
            self.log.poll_interval_ms
        );
        anyhow::ensure!(
            self.log.channel_capacity > 0,
            "log.channel_capacity must be > 0, got {}",
            self.log.channel_capacity
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
