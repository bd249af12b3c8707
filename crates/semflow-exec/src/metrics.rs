//! Metrics/tracing hooks.
//!
//! Structured events only; exporters are wired in the binary layer.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::debug_span!("semflow", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::debug!(%event, %k, %v, "metric");
    }
}
