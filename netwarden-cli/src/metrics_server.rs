//! Prometheus metrics endpoint.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! Installed only when `[metrics] enabled = true`; otherwise every
//! `metrics::counter!()` call in the library crates is a no-op.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use netwarden_core::config::MetricsConfig;

/// Parse `listen_addr:port` into a socket address.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr: SocketAddr = if config.listen_addr.contains(':') {
        format!("[{}]:{}", config.listen_addr, config.port)
    } else {
        format!("{}:{}", config.listen_addr, config.port)
    }
    .parse()
    .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))?;
    Ok(addr)
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Must be called at most once per process, from inside the tokio runtime.
///
/// # Errors
///
/// - The address does not parse
/// - Socket binding fails or a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    netwarden_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
