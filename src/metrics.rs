//! Service metrics
//!
//! Lock-free counters, gauges, and latency histograms plus a Prometheus
//! text exposition over all of them. Instruments are plain atomics so hot
//! paths never block on a metric update.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonically increasing counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-write-wins gauge
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bucket bounds for latency histograms, in microseconds
const LATENCY_BUCKETS_US: [u64; 10] = [
    1_000,
    5_000,
    10_000,
    25_000,
    50_000,
    100_000,
    250_000,
    500_000,
    1_000_000,
    5_000_000,
];

/// Fixed-bucket latency histogram.
///
/// The final slot counts observations above every bound; it only surfaces
/// through the +Inf bucket of the exposition.
#[derive(Debug)]
pub struct Histogram {
    counts: [AtomicU64; LATENCY_BUCKETS_US.len() + 1],
    sum_us: AtomicU64,
    total: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        let slot = LATENCY_BUCKETS_US
            .iter()
            .position(|&bound| us <= bound)
            .unwrap_or(LATENCY_BUCKETS_US.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Mean observed latency in milliseconds
    pub fn mean_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum_us.load(Ordering::Relaxed) as f64 / count as f64 / 1_000.0
    }

    fn slot_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    fn sum_seconds(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Times one operation and feeds the result into a histogram
pub struct Timer(Instant);

impl Timer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Record the elapsed time and hand it back
    pub fn record(self, histogram: &Histogram) -> Duration {
        let elapsed = self.0.elapsed();
        histogram.observe(elapsed);
        elapsed
    }
}

/// All service metrics
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    // Ask pipeline metrics
    pub asks_total: Counter,
    pub ask_latency: Histogram,
    pub asks_failed: Counter,

    // Search metrics
    pub searches_total: Counter,
    pub search_latency: Histogram,
    pub searches_failed: Counter,

    // Retrieval backend metrics
    pub sparse_degraded_total: Counter,
    pub dense_degraded_total: Counter,
    pub rerank_latency: Histogram,
    pub rerank_failures_total: Counter,

    // Cache metrics
    pub cache_memory_hits: Counter,
    pub cache_shared_hits: Counter,
    pub cache_misses: Counter,
    pub cache_degraded_misses: Counter,
    pub cache_store_errors: Counter,

    // Encoder metrics
    pub encode_requests_total: Counter,
    pub encode_latency: Histogram,
    pub encode_errors_total: Counter,

    // Index metrics
    pub docs_indexed_total: Counter,
    pub commits_total: Counter,
    pub indexed_docs: Gauge,

    // Resource metrics
    pub memory_usage_bytes: Gauge,

    // HTTP metrics
    pub http_requests_total: Counter,
    pub http_request_latency: Histogram,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Refresh the RSS gauge from the OS
    pub fn update_memory_usage(&self) {
        if let Some(bytes) = process_rss_bytes() {
            self.memory_usage_bytes.set(bytes);
        }
    }

    /// Render every metric in the Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut exp = Exposition::new();

        // Ask pipeline metrics
        exp.counter("faqdex_asks_total", "Total number of ask requests", self.asks_total.get());
        exp.histogram("faqdex_ask_latency_seconds", "Ask latency in seconds", &self.ask_latency);
        exp.counter("faqdex_asks_failed_total", "Total number of failed ask requests", self.asks_failed.get());

        // Search metrics
        exp.counter("faqdex_searches_total", "Total number of search requests", self.searches_total.get());
        exp.histogram("faqdex_search_latency_seconds", "Search latency in seconds", &self.search_latency);
        exp.counter("faqdex_searches_failed_total", "Total number of failed searches", self.searches_failed.get());

        // Retrieval backend metrics
        exp.counter("faqdex_sparse_degraded_total", "Searches degraded by sparse backend failure", self.sparse_degraded_total.get());
        exp.counter("faqdex_dense_degraded_total", "Searches degraded by dense backend failure", self.dense_degraded_total.get());
        exp.histogram("faqdex_rerank_latency_seconds", "Rerank latency in seconds", &self.rerank_latency);
        exp.counter("faqdex_rerank_failures_total", "Total rerank failures (fell back to fused order)", self.rerank_failures_total.get());

        // Cache metrics
        exp.counter("faqdex_cache_memory_hits_total", "Cache hits served from the in-memory tier", self.cache_memory_hits.get());
        exp.counter("faqdex_cache_shared_hits_total", "Cache hits served from the shared tier", self.cache_shared_hits.get());
        exp.counter("faqdex_cache_misses_total", "Cache misses", self.cache_misses.get());
        exp.counter("faqdex_cache_degraded_misses_total", "Cache misses with the shared tier unreachable", self.cache_degraded_misses.get());
        exp.counter("faqdex_cache_store_errors_total", "Shared cache store errors (swallowed)", self.cache_store_errors.get());

        // Encoder metrics
        exp.counter("faqdex_encode_requests_total", "Total query encode requests", self.encode_requests_total.get());
        exp.histogram("faqdex_encode_latency_seconds", "Encode request latency in seconds", &self.encode_latency);
        exp.counter("faqdex_encode_errors_total", "Total encode errors", self.encode_errors_total.get());

        // Index metrics
        exp.counter("faqdex_docs_indexed_total", "Total number of documents indexed", self.docs_indexed_total.get());
        exp.counter("faqdex_commits_total", "Total number of index commits", self.commits_total.get());
        exp.gauge("faqdex_indexed_docs", "Current number of indexed documents", self.indexed_docs.get());

        // Resource metrics
        exp.gauge("faqdex_memory_usage_bytes", "Current memory usage in bytes", self.memory_usage_bytes.get());

        // HTTP metrics
        exp.counter("faqdex_http_requests_total", "Total HTTP requests", self.http_requests_total.get());
        exp.histogram("faqdex_http_request_latency_seconds", "HTTP request latency in seconds", &self.http_request_latency);

        exp.finish()
    }
}

/// Prometheus text-format builder
struct Exposition {
    out: String,
}

impl Exposition {
    fn new() -> Self {
        Self {
            out: String::with_capacity(4096),
        }
    }

    fn counter(&mut self, name: &str, help: &str, value: u64) {
        self.scalar("counter", name, help, value);
    }

    fn gauge(&mut self, name: &str, help: &str, value: u64) {
        self.scalar("gauge", name, help, value);
    }

    fn scalar(&mut self, kind: &str, name: &str, help: &str, value: u64) {
        self.header(name, help, kind);
        let _ = writeln!(self.out, "{} {}", name, value);
        self.out.push('\n');
    }

    fn histogram(&mut self, name: &str, help: &str, hist: &Histogram) {
        self.header(name, help, "histogram");

        // le buckets are cumulative; the overflow slot only feeds +Inf
        let slots = hist.slot_counts();
        let mut running = 0u64;
        for (bound, count) in LATENCY_BUCKETS_US.iter().zip(&slots) {
            running += count;
            let _ = writeln!(
                self.out,
                "{}_bucket{{le=\"{:.3}\"}} {}",
                name,
                *bound as f64 / 1_000_000.0,
                running
            );
        }
        let total = hist.count();
        let _ = writeln!(self.out, "{}_bucket{{le=\"+Inf\"}} {}", name, total);
        let _ = writeln!(self.out, "{}_sum {:.6}", name, hist.sum_seconds());
        let _ = writeln!(self.out, "{}_count {}", name, total);
        self.out.push('\n');
    }

    fn header(&mut self, name: &str, help: &str, kind: &str) {
        let _ = writeln!(self.out, "# HELP {} {}", name, help);
        let _ = writeln!(self.out, "# TYPE {} {}", name, kind);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Resident set size of this process, if the platform exposes it
fn process_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        return Some(pages * 4096);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let counter = Counter::new();
        counter.inc();
        counter.inc();
        counter.add(3);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_gauge_takes_last_value() {
        let gauge = Gauge::new();
        gauge.set(10);
        gauge.set(3);
        assert_eq!(gauge.get(), 3);
    }

    #[test]
    fn test_histogram_mean() {
        let hist = Histogram::new();
        hist.observe(Duration::from_millis(5));
        hist.observe(Duration::from_millis(15));

        assert_eq!(hist.count(), 2);
        assert!((hist.mean_ms() - 10.0).abs() < 1.0);
    }

    #[test]
    fn test_histogram_routes_overflow_to_last_slot() {
        let hist = Histogram::new();
        hist.observe(Duration::from_secs(10));

        let slots = hist.slot_counts();
        assert_eq!(slots[LATENCY_BUCKETS_US.len()], 1);
        assert!(slots[..LATENCY_BUCKETS_US.len()].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_timer_records_elapsed() {
        let hist = Histogram::new();
        let timer = Timer::start();

        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.record(&hist);

        assert!(elapsed.as_millis() >= 10);
        assert_eq!(hist.count(), 1);
    }

    #[test]
    fn test_prometheus_exposition() {
        let metrics = ServiceMetrics::new();
        metrics.asks_total.add(42);
        metrics.ask_latency.observe(Duration::from_millis(50));
        metrics.ask_latency.observe(Duration::from_millis(200));
        metrics.memory_usage_bytes.set(1_048_576);
        metrics.cache_shared_hits.inc();

        let output = metrics.to_prometheus();

        assert!(output.contains("# HELP faqdex_asks_total"));
        assert!(output.contains("# TYPE faqdex_asks_total counter"));
        assert!(output.contains("faqdex_asks_total 42"));

        assert!(output.contains("# TYPE faqdex_ask_latency_seconds histogram"));
        assert!(output.contains("faqdex_ask_latency_seconds_bucket{le=\"0.050\"} 1"));
        // le buckets accumulate
        assert!(output.contains("faqdex_ask_latency_seconds_bucket{le=\"0.250\"} 2"));
        assert!(output.contains("faqdex_ask_latency_seconds_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("faqdex_ask_latency_seconds_count 2"));

        assert!(output.contains("# TYPE faqdex_memory_usage_bytes gauge"));
        assert!(output.contains("faqdex_memory_usage_bytes 1048576"));
        assert!(output.contains("faqdex_cache_shared_hits_total 1"));
    }

    #[test]
    fn test_update_memory_usage() {
        let metrics = ServiceMetrics::new();
        metrics.update_memory_usage();
        if cfg!(target_os = "linux") {
            assert!(metrics.memory_usage_bytes.get() > 0);
        }
    }
}
