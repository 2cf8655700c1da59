use anyhow::Result;
use phpfpm_log_exporter::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// RUST_LOG wins; otherwise INFO, plus DEBUG for the ingest loop when debug_parse is on.
fn env_filter(debug_parse: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_parse {
            EnvFilter::new("info,phpfpm_log_exporter::ingest=debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = config::AppConfig::load()?;
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(env_filter(app_config.log.debug_parse))
        .init();

    tracing::info!("{}", version::banner());
    let addr = app_config.server.socket_addr()?;
    tracing::info!(
        "listens on http://{}{}",
        addr,
        app_config.server.metrics_path
    );
    tracing::info!("parsing log file: {}", app_config.log.file);
    if app_config.log.debug_parse {
        tracing::info!("debug-parse enabled");
    } else {
        tracing::info!("debug-parse disabled");
    }

    let aggregator = Arc::new(metrics::MetricsAggregator::new()?);
    let follower = match follower::LogFollower::open(
        &app_config.log.file,
        app_config.log.follower_config(),
    )
    .await
    {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, "cannot follow log file");
            return Err(e.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut worker_handle = worker::spawn(
        worker::WorkerDeps {
            follower,
            aggregator: aggregator.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig {
            debug_parse: app_config.log.debug_parse,
            channel_capacity: app_config.log.channel_capacity,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );

    let app = routes::app(aggregator, app_config.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = &mut worker_handle => {
            anyhow::bail!("log ingest stopped");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
        }
    }

    tracing::info!("Stop php-fpm log exporter");
    Ok(())
}
