//! Prometheus metrics.

use crate::config::MetricsConfig;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Handle to the installed Prometheus recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    listen_addr: SocketAddr,
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }

    /// Address of the scrape endpoint.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

/// Returns the scrape endpoint address for a config.
#[must_use]
pub const fn listen_addr(config: &MetricsConfig) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port)
}

/// Installs the Prometheus recorder and HTTP listener.
///
/// Returns `Ok(None)` when metrics are disabled. Without a recorder every
/// `metrics::counter!` call in the crate is a no-op.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot bind.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let listen_addr = listen_addr(config);
    let builder = PrometheusBuilder::new().with_http_listener(listen_addr);

    // The scrape listener is the only async component in the process, so
    // it gets a dedicated current-thread runtime parked on its own thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;

    let (recorder, exporter) = {
        let _guard = runtime.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let prometheus = recorder.handle();
    ::metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })?;
    runtime.spawn(exporter);

    std::thread::Builder::new()
        .name("metrics-exporter-prometheus-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;

    tracing::info!(addr = %listen_addr, "Prometheus exporter listening");
    Ok(Some(MetricsHandle {
        prometheus,
        listen_addr,
    }))
}
