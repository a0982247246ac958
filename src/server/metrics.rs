//! Prometheus metrics for experiment operations
//!
//! Labels are bounded (operation name, outcome code); experiment and org ids
//! never appear in labels.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub type SharedMetrics = Arc<ServiceMetrics>;

pub struct ServiceMetrics {
    registry: Registry,
    operations_total: IntCounterVec,
    operation_duration: HistogramVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    persistence_failures: IntCounter,
}

/// Create a metrics set on its own registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let operations_total = IntCounterVec::new(
        Opts::new(
            "varia_operations_total",
            "Experiment operations by outcome",
        ),
        &["operation", "outcome"],
    )?;
    let operation_duration = HistogramVec::new(
        HistogramOpts::new(
            "varia_operation_duration_seconds",
            "Experiment operation duration",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"],
    )?;
    let cache_hits = IntCounter::new("varia_results_cache_hits_total", "Results cache hits")?;
    let cache_misses = IntCounter::new("varia_results_cache_misses_total", "Results cache misses")?;
    let persistence_failures = IntCounter::new(
        "varia_persistence_failures_total",
        "Store operations that failed",
    )?;

    registry.register(Box::new(operations_total.clone()))?;
    registry.register(Box::new(operation_duration.clone()))?;
    registry.register(Box::new(cache_hits.clone()))?;
    registry.register(Box::new(cache_misses.clone()))?;
    registry.register(Box::new(persistence_failures.clone()))?;

    Ok(Arc::new(ServiceMetrics {
        registry,
        operations_total,
        operation_duration,
        cache_hits,
        cache_misses,
        persistence_failures,
    }))
}

impl ServiceMetrics {
    /// Record one finished operation; `outcome` is "ok" or an error code
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    /// Encode every metric in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
