//! Prometheus metrics

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref RUTAS_ASIGNADAS: IntCounterVec = register_int_counter_vec!(
        "sipat_rutas_cortas_asignadas_total",
        "Short routes created, by assignment type",
        &["tipo"]
    )
    .unwrap();
    pub static ref SOLICITUDES_RECHAZADAS: IntCounterVec = register_int_counter_vec!(
        "sipat_solicitudes_rechazadas_total",
        "Planner requests rejected, by error code",
        &["codigo"]
    )
    .unwrap();
    pub static ref TRANSICIONES: IntCounterVec = register_int_counter_vec!(
        "sipat_transiciones_total",
        "Route state transitions, by action",
        &["accion"]
    )
    .unwrap();
}

/// Render every registered metric in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
