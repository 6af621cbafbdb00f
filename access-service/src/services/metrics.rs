use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::models::PermissionScope;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is a no-op.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    match METRICS_HANDLE.get() {
        Some(handle) => handle.render(),
        None => "# Metrics recorder not initialized\n".to_string(),
    }
}

pub fn record_authorization(scope: PermissionScope, allowed: bool) {
    metrics::counter!(
        "authorization_checks_total",
        "scope" => scope.as_str(),
        "outcome" => if allowed { "allow" } else { "deny" },
    )
    .increment(1);
}

pub fn record_api_key_rejection(reason: &'static str) {
    metrics::counter!("api_key_rejections_total", "reason" => reason).increment(1);
}
