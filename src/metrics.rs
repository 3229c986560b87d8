use std::net::SocketAddr;
use tracing::{info, warn};

/// Install the Prometheus exporter. Metric emission elsewhere in the crate
/// is a no-op until this runs, so commands opt in explicitly.
pub fn init_metrics() {
    let addr_str =
        std::env::var("SALIDA_METRICS_ADDR").unwrap_or_else(|_| "127.0.0.1:9464".to_string());
    let addr: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(_) => {
            warn!(
                "Invalid metrics addr '{}', using default 127.0.0.1:9464",
                addr_str
            );
            "127.0.0.1:9464".parse::<SocketAddr>().unwrap()
        }
    };

    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => {
            info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Failed to install Prometheus exporter: {}", e);
        }
    }
}
