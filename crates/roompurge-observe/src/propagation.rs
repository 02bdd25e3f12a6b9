//! W3C trace-context propagation over internal HTTP calls.
//!
//! The client side injects the current span's context into outgoing
//! headers; the server side extracts it and parents the handler span on it.
//! Without an OpenTelemetry layer installed both are no-ops.

use std::collections::HashMap;

use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header name of the W3C trace parent.
pub const TRACEPARENT: &str = "traceparent";

/// Trace headers (`traceparent`, `tracestate`) for the current span.
pub fn inject_current() -> HashMap<String, String> {
    let context = tracing::Span::current().context();
    let mut headers = HashMap::new();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&context, &mut headers);
    });
    headers
}

/// Parent `span` on the remote context carried by `headers`, if any.
pub fn set_remote_parent(span: &tracing::Span, headers: &HashMap<String, String>) {
    if !headers.contains_key(TRACEPARENT) {
        return;
    }
    let context =
        opentelemetry::global::get_text_map_propagator(|propagator| propagator.extract(headers));
    let _ = span.set_parent(context);
}
