//! Metrics reported by the watcher and the collection loop.
//!
//! The watcher only talks to a [`MetricsSink`]; [`PrometheusSink`] keeps the
//! values in its own registry so several watchers never share global state.
use std::time::Duration;

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Fire-and-forget receiver of watcher metrics.
pub trait MetricsSink: Send + Sync {
    fn set_subsystem_enabled(&self, subsystem: &str, enabled: bool);
    fn set_watch_count(&self, subsystem: &str, count: usize);
    fn observe_collection_duration(&self, subsystem: &str, micros: u64);
    fn observe_total_collection_duration(&self, micros: u64);
    /// A pass was skipped because the previous one was still running.
    fn record_skipped_collection(&self);
}

/// Converts a duration into the microseconds reported to a [`MetricsSink`].
pub fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn set_subsystem_enabled(&self, _subsystem: &str, _enabled: bool) {}
    fn set_watch_count(&self, _subsystem: &str, _count: usize) {}
    fn observe_collection_duration(&self, _subsystem: &str, _micros: u64) {}
    fn observe_total_collection_duration(&self, _micros: u64) {}
    fn record_skipped_collection(&self) {}
}

#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    subsystem_enabled: IntGaugeVec,
    watches: IntGaugeVec,
    subsystem_duration: HistogramVec,
    total_duration: Histogram,
    skipped: IntCounter,
}

impl PrometheusSink {
    /// Creates and registers all metrics with a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let buckets = prometheus::exponential_buckets(50.0, 2.0, 16)?;

        let subsystem_enabled = IntGaugeVec::new(
            Opts::new(
                "cgwatch_cgroup_subsystem_enabled",
                "Whether the cgroup subsystem is watched (1) or not (0)",
            ),
            &["subsystem"],
        )?;
        let watches = IntGaugeVec::new(
            Opts::new(
                "cgwatch_cgroup_watches",
                "Number of active filesystem watches in the subsystem hierarchy",
            ),
            &["subsystem"],
        )?;
        let subsystem_duration = HistogramVec::new(
            HistogramOpts::new(
                "cgwatch_cgroup_subsystem_stats_collection_duration_microseconds",
                "Time spent collecting the stats of one subsystem tree",
            )
            .buckets(buckets.clone()),
            &["subsystem"],
        )?;
        let total_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cgwatch_cgroup_stats_collection_duration_microseconds",
                "Time spent in one collection pass over all subsystem trees",
            )
            .buckets(buckets),
        )?;
        let skipped = IntCounter::new(
            "cgwatch_cgroup_stats_collection_skipped_total",
            "Collection passes skipped because the previous pass was still running",
        )?;

        registry.register(Box::new(subsystem_enabled.clone()))?;
        registry.register(Box::new(watches.clone()))?;
        registry.register(Box::new(subsystem_duration.clone()))?;
        registry.register(Box::new(total_duration.clone()))?;
        registry.register(Box::new(skipped.clone()))?;

        Ok(Self {
            registry,
            subsystem_enabled,
            watches,
            subsystem_duration,
            total_duration,
            skipped,
        })
    }

    /// Renders every metric in the Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl MetricsSink for PrometheusSink {
    fn set_subsystem_enabled(&self, subsystem: &str, enabled: bool) {
        self.subsystem_enabled
            .with_label_values(&[subsystem])
            .set(i64::from(enabled));
    }

    fn set_watch_count(&self, subsystem: &str, count: usize) {
        self.watches
            .with_label_values(&[subsystem])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn observe_collection_duration(&self, subsystem: &str, micros: u64) {
        self.subsystem_duration
            .with_label_values(&[subsystem])
            .observe(micros as f64);
    }

    fn observe_total_collection_duration(&self, micros: u64) {
        self.total_duration.observe(micros as f64);
    }

    fn record_skipped_collection(&self) {
        self.skipped.inc();
    }
}

/// Sink keeping every report in memory, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub enabled: std::sync::Mutex<std::collections::BTreeMap<String, bool>>,
    pub watch_counts: std::sync::Mutex<std::collections::BTreeMap<String, usize>>,
    pub collected: std::sync::Mutex<Vec<String>>,
    pub passes: std::sync::atomic::AtomicUsize,
    pub skipped: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MetricsSink for RecordingSink {
    fn set_subsystem_enabled(&self, subsystem: &str, enabled: bool) {
        self.enabled.lock().unwrap().insert(subsystem.to_owned(), enabled);
    }

    fn set_watch_count(&self, subsystem: &str, count: usize) {
        self.watch_counts.lock().unwrap().insert(subsystem.to_owned(), count);
    }

    fn observe_collection_duration(&self, subsystem: &str, _micros: u64) {
        self.collected.lock().unwrap().push(subsystem.to_owned());
    }

    fn observe_total_collection_duration(&self, _micros: u64) {
        self.passes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn record_skipped_collection(&self) {
        self.skipped.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_sink_encodes_metrics() {
        let sink = PrometheusSink::new().unwrap();
        sink.set_subsystem_enabled("cpu", true);
        sink.set_subsystem_enabled("memory", false);
        sink.set_watch_count("cpu", 3);
        sink.observe_collection_duration("cpu", 120);
        sink.observe_total_collection_duration(250);
        sink.record_skipped_collection();

        let text = sink.encode().unwrap();
        assert!(text.contains(r#"cgwatch_cgroup_subsystem_enabled{subsystem="cpu"} 1"#));
        assert!(text.contains(r#"cgwatch_cgroup_subsystem_enabled{subsystem="memory"} 0"#));
        assert!(text.contains(r#"cgwatch_cgroup_watches{subsystem="cpu"} 3"#));
        assert!(text.contains(
            r#"cgwatch_cgroup_subsystem_stats_collection_duration_microseconds_count{subsystem="cpu"} 1"#
        ));
        assert!(text.contains("cgwatch_cgroup_stats_collection_duration_microseconds_sum 250"));
        assert!(text.contains("cgwatch_cgroup_stats_collection_skipped_total 1"));
    }

    #[test]
    fn test_sinks_are_independent() {
        let first = PrometheusSink::new().unwrap();
        let second = PrometheusSink::new().unwrap();
        first.record_skipped_collection();

        assert!(first.encode().unwrap().contains("skipped_total 1"));
        assert!(second.encode().unwrap().contains("skipped_total 0"));
    }

    #[test]
    fn test_as_micros() {
        assert_eq!(as_micros(Duration::from_millis(3)), 3000);
    }
}
