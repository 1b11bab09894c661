//! Request metrics and periodic summaries for the scoring service.

use crate::error::ScoringError;
use crate::models::scorer::RiskAssessment;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Lower edge of the first score bucket
const BUCKET_START: f64 = 60.0;
/// Width of each score bucket in points
const BUCKET_WIDTH: f64 = 5.0;
/// Buckets covering [60, 95]; 95 lands in the last one
const BUCKET_COUNT: usize = 7;

/// Metrics collector for scoring requests
pub struct ScoringMetrics {
    /// Requests that produced a risk score
    pub requests_scored: AtomicU64,
    /// Requests rejected for bad input
    pub client_errors: AtomicU64,
    /// Requests that failed inside the service
    pub server_errors: AtomicU64,
    /// Scores that received a random perturbation
    pub perturbed_scores: AtomicU64,
    /// Scoring latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; BUCKET_COUNT]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            requests_scored: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            perturbed_scores: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; BUCKET_COUNT]),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored request
    pub fn record_score(&self, latency: Duration, assessment: &RiskAssessment) {
        self.requests_scored.fetch_add(1, Ordering::Relaxed);
        if assessment.is_perturbed() {
            self.perturbed_scores.fetch_add(1, Ordering::Relaxed);
        }

        self.record_latency(latency);

        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket_index(assessment.risk_score)] += 1;
        }
    }

    /// Record a failed request
    pub fn record_error(&self, error: &ScoringError) {
        if error.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get latency statistics
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Scored requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; BUCKET_COUNT] {
        self.score_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; BUCKET_COUNT])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let scored = self.requests_scored.load(Ordering::Relaxed);
        let client_errors = self.client_errors.load(Ordering::Relaxed);
        let server_errors = self.server_errors.load(Ordering::Relaxed);
        let perturbed = self.perturbed_scores.load(Ordering::Relaxed);
        let latency = self.get_latency_stats();

        info!(
            scored,
            client_errors,
            server_errors,
            perturbed,
            throughput = format!("{:.1} req/s", self.get_throughput()),
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Scoring metrics summary"
        );

        let distribution = self.get_score_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let low = BUCKET_START + i as f64 * BUCKET_WIDTH;
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "  {:>4.0}-{:<4.0} {:>7} ({:>5.1}%) {}",
                low,
                low + BUCKET_WIDTH,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_index(score: f64) -> usize {
    let offset = ((score - BUCKET_START) / BUCKET_WIDTH).floor();
    if offset <= 0.0 {
        0
    } else {
        (offset as usize).min(BUCKET_COUNT - 1)
    }
}

/// Latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(risk_score: f64, perturbation: f64) -> RiskAssessment {
        RiskAssessment {
            probability: 0.5,
            base: risk_score - perturbation,
            perturbation,
            risk_score,
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = ScoringMetrics::new();

        metrics.record_score(Duration::from_micros(100), &assessment(60.0, 0.0));
        metrics.record_score(Duration::from_micros(300), &assessment(81.5, 3.2));
        metrics.record_error(&ScoringError::missing_field("amount"));
        metrics.record_error(&ScoringError::inference("boom"));

        assert_eq!(metrics.requests_scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.perturbed_scores.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.client_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.server_errors.load(Ordering::Relaxed), 1);

        let latency = metrics.get_latency_stats();
        assert_eq!(latency.count, 2);
        assert_eq!(latency.mean_us, 200);
        assert_eq!(latency.max_us, 300);
    }

    #[test]
    fn test_score_buckets() {
        assert_eq!(bucket_index(60.0), 0);
        assert_eq!(bucket_index(64.99), 0);
        assert_eq!(bucket_index(65.0), 1);
        assert_eq!(bucket_index(94.99), 6);
        assert_eq!(bucket_index(95.0), 6);

        let metrics = ScoringMetrics::new();
        metrics.record_score(Duration::from_micros(1), &assessment(95.0, 0.0));
        assert_eq!(metrics.get_score_distribution()[6], 1);
    }

    #[test]
    fn test_empty_latency_stats() {
        let stats = ScoringMetrics::new().get_latency_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99_us, 0);
    }
}
