/**
 * streaming/mod.rs
 * =================
 * Stream inspection stages used by the probe.
 *
 *   - playlist: minimal M3U8 analysis (variants, segments).
 *   - resolver: decides manifest vs direct endpoint and walks variant
 *     playlists down to the highest-resolution media playlist.
 *   - sampler: bounded segment downloads for throughput estimation.
 */
pub mod playlist;
pub mod resolver;
pub mod sampler;

pub use resolver::{ManifestResolved, PlaylistResolver, ResolveError, ResolvedStream};
pub use sampler::{SampleError, SampleOutcome, SegmentSampler};

// Stream stage metrics instrumentation
pub mod metrics {
    use opentelemetry::global;
    use opentelemetry::metrics::{Counter, Histogram, Meter};
    use std::sync::OnceLock;

    /// Instruments for the resolver and sampler.
    pub struct StreamingMetrics {
        pub resolve_total: Counter<u64>,
        pub resolve_errors_total: Counter<u64>,
        pub variant_hops_total: Counter<u64>,
        pub segments_sampled_total: Counter<u64>,
        pub segment_errors_total: Counter<u64>,
        pub segment_fetch_seconds: Histogram<f64>,
    }

    impl StreamingMetrics {
        fn new() -> Self {
            let meter: Meter = global::meter("m3u-prober.streaming");
            Self {
                resolve_total: meter
                    .u64_counter("stream_resolve_total")
                    .with_description("Resolved candidates by endpoint kind")
                    .build(),
                resolve_errors_total: meter
                    .u64_counter("stream_resolve_errors_total")
                    .with_description("Resolution failures by cause")
                    .build(),
                variant_hops_total: meter
                    .u64_counter("stream_variant_hops_total")
                    .with_description("Variant playlists followed during resolution")
                    .build(),
                segments_sampled_total: meter
                    .u64_counter("segments_sampled_total")
                    .with_description("Segments downloaded for throughput sampling")
                    .build(),
                segment_errors_total: meter
                    .u64_counter("segment_errors_total")
                    .with_description("Segment downloads skipped after an error")
                    .build(),
                segment_fetch_seconds: meter
                    .f64_histogram("segment_fetch_seconds")
                    .with_description("Wall-clock time per sampled segment")
                    .with_unit("s")
                    .build(),
            }
        }
    }

    static METRICS: OnceLock<StreamingMetrics> = OnceLock::new();

    /// Public accessor for global streaming metrics instruments.
    pub fn metrics() -> &'static StreamingMetrics {
        METRICS.get_or_init(StreamingMetrics::new)
    }
}

pub use opentelemetry::KeyValue;
