//! ## appvakt-telemetry::metrics
//! **Prometheus counters for controller operations**

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub rules_installed: prometheus::Counter,
    pub rules_removed: prometheus::Counter,
    pub reconcile_passes: prometheus::Counter,
    pub reconcile_duration: prometheus::Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let rules_installed = Counter::new(
            "appvakt_rules_installed_total",
            "Block rule sets installed by this process",
        )
        .unwrap();
        let rules_removed = Counter::new(
            "appvakt_rules_removed_total",
            "Block rule sets removed by this process",
        )
        .unwrap();
        let reconcile_passes = Counter::new(
            "appvakt_reconcile_passes_total",
            "Completed reconcile passes",
        )
        .unwrap();

        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "appvakt_reconcile_duration_seconds",
                "Wall time of one reconcile pass",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .unwrap();

        registry.register(Box::new(rules_installed.clone())).unwrap();
        registry.register(Box::new(rules_removed.clone())).unwrap();
        registry
            .register(Box::new(reconcile_passes.clone()))
            .unwrap();
        registry
            .register(Box::new(reconcile_duration.clone()))
            .unwrap();

        Self {
            registry,
            rules_installed,
            rules_removed,
            reconcile_passes,
            reconcile_duration,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap())
    }
}
