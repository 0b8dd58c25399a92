//! Metric name constants and recording helpers

use std::sync::LazyLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Meter shared by every Toolgate instrument
pub static METER: LazyLock<Meter> = LazyLock::new(|| opentelemetry::global::meter("toolgate"));

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

/// Histogram in seconds registered on [`METER`]
pub fn duration_histogram(name: &'static str) -> Histogram<f64> {
    METER.f64_histogram(name).with_unit("s").build()
}

/// Counter registered on [`METER`]
pub fn counter(name: &'static str) -> Counter<u64> {
    METER.u64_counter(name).build()
}

// Backend metric names
pub const BACKEND_REQUEST_DURATION: &str = "toolgate.backend.request.duration";
pub const BACKEND_REQUEST_COUNT: &str = "toolgate.backend.request.count";
pub const TOKEN_USAGE: &str = "toolgate.token.usage";

// Emulation metric names
pub const NORMALIZATION_DURATION: &str = "toolgate.normalization.duration";
pub const EMULATED_TOOL_CALLS: &str = "toolgate.emulation.tool_calls";

// Tool execution metric names
pub const TOOL_CALL_DURATION: &str = "toolgate.tool_call.duration";
pub const TOOL_CALL_COUNT: &str = "toolgate.tool_call.count";
pub const TOOL_CALLS_DROPPED: &str = "toolgate.tool_call.dropped";
