//! Report module: latency statistics and a human-readable comparison table.

use std::time::Duration;

/// Results from one workload run (one target, one reader count).
#[derive(Debug, Clone)]
pub struct WorkloadResult {
    pub target: String,
    pub readers: usize,
    /// Every query latency from every reader.
    pub latencies: Vec<Duration>,
    /// Wall time from the start barrier until the last reader finished.
    pub elapsed: Duration,
    /// Lookups whose id was not present.
    pub misses: usize,
}

impl WorkloadResult {
    pub fn new(target: &str, readers: usize) -> Self {
        Self {
            target: target.to_string(),
            readers,
            latencies: Vec::new(),
            elapsed: Duration::ZERO,
            misses: 0,
        }
    }

    pub fn add_reader(&mut self, latencies: Vec<Duration>, misses: usize) {
        self.latencies.extend(latencies);
        self.misses += misses;
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn queries(&self) -> usize {
        self.latencies.len()
    }

    pub fn mean_us(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.latencies.iter().map(|d| d.as_secs_f64() * 1e6).sum();
        sum / self.latencies.len() as f64
    }

    pub fn percentile_us(&self, pct: f64) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self
            .latencies
            .iter()
            .map(|d| d.as_secs_f64() * 1e6)
            .collect();
        sorted.sort_by(f64::total_cmp);
        let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Aggregate queries per second across all readers.
    pub fn throughput_qps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.queries() as f64 / secs
    }
}

/// Print a formatted report of all runs.
pub fn print_report(load_time: Duration, rows: u64, results: &[WorkloadResult]) {
    println!("\n{}", "=".repeat(80));
    println!("  SQLite Memory-Snapshot Read Benchmark");
    println!(
        "  Snapshot load: {} rows in {:.2}ms",
        rows,
        load_time.as_secs_f64() * 1000.0
    );
    println!("{}", "=".repeat(80));

    for result in results {
        println!(
            "\n  Target: {} | Readers: {}",
            result.target, result.readers
        );
        println!("  {}", "-".repeat(60));
        println!("  Queries:         {:>10}", result.queries());
        println!("  Mean:            {:>10.1}µs", result.mean_us());
        println!("  p50:             {:>10.1}µs", result.percentile_us(50.0));
        println!("  p95:             {:>10.1}µs", result.percentile_us(95.0));
        println!("  p99:             {:>10.1}µs", result.percentile_us(99.0));
        println!("  Throughput:      {:>10.0} q/s", result.throughput_qps());
        if result.misses > 0 {
            println!("  Misses:          {:>10}", result.misses);
        }
    }

    println!("\n{}", "=".repeat(80));

    if results.len() >= 2 {
        println!("\n  Comparison Summary:");
        println!(
            "  {:16} {:>10} {:>10} {:>10} {:>12}",
            "Target / Rdrs", "Mean (µs)", "p95 (µs)", "p99 (µs)", "q/s"
        );
        println!("  {}", "-".repeat(62));
        for r in results {
            let label = format!("{}/{}", r.target, r.readers);
            println!(
                "  {:16} {:>10.1} {:>10.1} {:>10.1} {:>12.0}",
                label,
                r.mean_us(),
                r.percentile_us(95.0),
                r.percentile_us(99.0),
                r.throughput_qps()
            );
        }
    }

    println!();
}
