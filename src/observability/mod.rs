//! Logging setup and probe-level metric instruments
//!
//! Metrics go through the OpenTelemetry global meter. Without an installed
//! meter provider the instruments are no-ops, so library users pay nothing
//! unless they wire an exporter.

use std::sync::OnceLock;

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::models::ProbeResult;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `log_filter` when set. `json` switches the fmt
/// layer to newline-delimited JSON.
pub fn init_logging(log_filter: &str, json: bool) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter))
        .map_err(|e| format!("invalid log filter '{log_filter}': {e}"))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| format!("failed to install tracing subscriber: {e}"))
}

/// Instruments for probe outcomes, dispatch and caching
pub struct ProbeMetrics {
    pub probes_total: Counter<u64>,
    pub probe_timeouts_total: Counter<u64>,
    pub probe_throughput_mbps: Histogram<f64>,
    pub probe_latency_ms: Histogram<f64>,
    pub cache_hits_total: Counter<u64>,
    pub cache_misses_total: Counter<u64>,
    pub cache_errors_total: Counter<u64>,
    pub dispatch_deadline_total: Counter<u64>,
}

impl ProbeMetrics {
    fn new() -> Self {
        let meter: Meter = global::meter("m3u-prober.probe");
        Self {
            probes_total: meter
                .u64_counter("probes_total")
                .with_description("Completed probes by outcome")
                .build(),
            probe_timeouts_total: meter
                .u64_counter("probe_timeouts_total")
                .with_description("Probes abandoned at the per-probe timeout")
                .build(),
            probe_throughput_mbps: meter
                .f64_histogram("probe_throughput_mbps")
                .with_description("Measured throughput of completed probes")
                .with_unit("Mbit/s")
                .build(),
            probe_latency_ms: meter
                .f64_histogram("probe_latency_ms")
                .with_description("Time to first playlist or first byte")
                .with_unit("ms")
                .build(),
            cache_hits_total: meter
                .u64_counter("probe_cache_hits_total")
                .with_description("Candidates answered from the probe cache")
                .build(),
            cache_misses_total: meter
                .u64_counter("probe_cache_misses_total")
                .with_description("Probe cache lookups without a fresh entry")
                .build(),
            cache_errors_total: meter
                .u64_counter("probe_cache_errors_total")
                .with_description("Probe cache operations that failed")
                .build(),
            dispatch_deadline_total: meter
                .u64_counter("dispatch_deadline_total")
                .with_description("Dispatch runs cut short by the overall deadline")
                .build(),
        }
    }

    /// Record one finished probe
    pub fn record(&self, result: &ProbeResult) {
        let outcome = match result.failure_reason {
            None => "passed".to_string(),
            Some(reason) => reason.to_string(),
        };
        self.probes_total.add(1, &[KeyValue::new("outcome", outcome)]);
        if result.throughput_mbps > 0.0 {
            self.probe_throughput_mbps.record(result.throughput_mbps, &[]);
        }
        if result.latency_ms > 0 {
            self.probe_latency_ms.record(result.latency_ms as f64, &[]);
        }
    }
}

static METRICS: OnceLock<ProbeMetrics> = OnceLock::new();

pub fn metrics() -> &'static ProbeMetrics {
    METRICS.get_or_init(ProbeMetrics::new)
}
