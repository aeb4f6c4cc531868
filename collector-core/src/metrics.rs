//! Process-wide thread-safe counters, gauges, and histograms (§5: "no
//! global mutable state beyond the process-wide metrics collector").

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

#[derive(Default)]
struct Histogram {
    samples: Vec<f64>,
}

impl Histogram {
    fn record(&mut self, value: f64) {
        self.samples.push(value);
    }

    fn count(&self) -> usize {
        self.samples.len()
    }

    fn sum(&self) -> f64 {
        self.samples.iter().sum()
    }
}

/// A shared handle, cheap to clone, intended to be constructed once at
/// process startup and threaded through every collector/source/provider.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: std::sync::Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    counters: Mutex<HashMap<String, AtomicU64>>,
    gauges: Mutex<HashMap<String, AtomicI64>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str, delta: u64) {
        self.inner
            .counters
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner
            .counters
            .lock()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        let mut gauges = self.inner.gauges.lock();
        match gauges.get(name) {
            Some(gauge) => gauge.store(value, Ordering::Relaxed),
            None => {
                gauges.insert(name.to_string(), AtomicI64::new(value));
            }
        }
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.inner
            .gauges
            .lock()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn observe(&self, name: &str, value: f64) {
        self.inner
            .histograms
            .lock()
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    pub fn histogram_summary(&self, name: &str) -> Option<(usize, f64)> {
        self.inner
            .histograms
            .lock()
            .get(name)
            .map(|h| (h.count(), h.sum()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        metrics.increment("items_scanned", 3);
        clone.increment("items_scanned", 2);
        assert_eq!(metrics.counter("items_scanned"), 5);
    }

    #[test]
    fn gauge_overwrites_rather_than_accumulates() {
        let metrics = MetricsCollector::new();
        metrics.set_gauge("queue_depth", 4);
        metrics.set_gauge("queue_depth", 7);
        assert_eq!(metrics.gauge("queue_depth"), 7);
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let metrics = MetricsCollector::new();
        metrics.observe("submit_latency_ms", 10.0);
        metrics.observe("submit_latency_ms", 20.0);
        let (count, sum) = metrics.histogram_summary("submit_latency_ms").unwrap();
        assert_eq!(count, 2);
        assert_eq!(sum, 30.0);
    }
}
