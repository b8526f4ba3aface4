//! Prometheus exposition for the counters the command layer maintains.

use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

/// Renders the default prometheus registry in text exposition format.
pub async fn metrics_handler() -> Result<String, MetricsError> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

/// JSON rendering of the same registry for dashboards that do not speak
/// the prometheus text format.
pub async fn metrics_json_handler() -> Result<Value, MetricsError> {
    let metric_families = prometheus::gather();
    let metrics: Vec<Value> = metric_families
        .iter()
        .map(|family| {
            let values: Vec<f64> = family
                .get_metric()
                .iter()
                .map(|metric| {
                    if metric.has_counter() {
                        metric.get_counter().get_value()
                    } else if metric.has_gauge() {
                        metric.get_gauge().get_value()
                    } else {
                        0.0
                    }
                })
                .collect();
            json!({
                "name": family.get_name(),
                "help": family.get_help(),
                "values": values,
            })
        })
        .collect();

    Ok(json!({
        "metrics": metrics,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_exposition_renders() {
        let body = metrics_handler().await.expect("metrics should encode");
        // Empty registry encodes to an empty document, which is still valid.
        assert!(body.is_empty() || body.contains("TYPE") || body.contains('\n'));
    }

    #[tokio::test]
    async fn json_exposition_has_timestamp() {
        let doc = metrics_json_handler().await.expect("metrics should encode");
        assert!(doc.get("timestamp").is_some());
        assert!(doc.get("metrics").is_some());
    }
}
