// GET handlers: landing page, version, metrics

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};

use super::AppState;
use crate::metrics;
use crate::version::{NAME, VERSION};

/// GET /: exporter landing page pointing at the metrics path.
pub(super) async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    let path = &state.config.server.metrics_path;
    Html(format!(
        "<html>\n<head><title>php-fpm log exporter</title></head>\n<body>\n\
         <h1>php-fpm log exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n</html>\n"
    ))
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET <metrics_path>: Prometheus text exposition of the aggregator's registry.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.aggregator.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, operation = "render_metrics", "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
