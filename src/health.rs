//! Health monitor: a rolling window of latency/error/cache-hit samples,
//! classified into a tri-state status for routing decisions.
//!
//! Grounded on the teacher's `cluster.rs` `PartitionState` (`Healthy` /
//! `Partitioned` / `Recovering`), a tri-state classification derived from a
//! simple quorum check. Brainy's thresholds are per-request-metric instead
//! of per-quorum, so the states are renamed `Healthy`/`Degraded`/`Unhealthy`
//! (spec §4.K) and the classifier walks a bounded sample window rather than
//! counting peers.

use crate::types::HealthStatus;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW_SIZE: usize = 500;
const DEFAULT_LATENCY_WARN_MS: u64 = 200;
const DEGRADED_ERROR_RATE: f64 = 0.01;
const UNHEALTHY_ERROR_RATE: f64 = 0.05;
const DEGRADED_CACHE_HIT_RATE: f64 = 0.5;
/// Below this many samples, cache hit rate is not yet meaningful.
const CACHE_WARMUP_SAMPLES: usize = 20;

struct Sample {
    latency: Duration,
    is_error: bool,
}

/// A point-in-time view for routing decisions and the config heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub reason: Option<String>,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub sample_count: usize,
    pub last_heartbeat_secs: i64,
}

pub struct HealthMonitor {
    window_size: usize,
    latency_warn: Duration,
    samples: Mutex<VecDeque<Sample>>,
    cache_hits: Mutex<VecDeque<bool>>,
    last_heartbeat: Mutex<Instant>,
    started_at: Instant,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SIZE, Duration::from_millis(DEFAULT_LATENCY_WARN_MS))
    }

    pub fn with_window(window_size: usize, latency_warn: Duration) -> Self {
        Self {
            window_size,
            latency_warn,
            samples: Mutex::new(VecDeque::with_capacity(window_size)),
            cache_hits: Mutex::new(VecDeque::with_capacity(window_size)),
            last_heartbeat: Mutex::new(Instant::now()),
            started_at: Instant::now(),
        }
    }

    pub fn record_request(&self, latency: Duration, is_error: bool) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() >= self.window_size {
            samples.pop_front();
        }
        samples.push_back(Sample { latency, is_error });
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let mut hits = self.cache_hits.lock().unwrap();
        if hits.len() >= self.window_size {
            hits.pop_front();
        }
        hits.push_back(hit);
    }

    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.lock().unwrap() = Instant::now();
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let samples = self.samples.lock().unwrap();
        let sample_count = samples.len();
        let error_count = samples.iter().filter(|s| s.is_error).count();
        let error_rate = if sample_count == 0 {
            0.0
        } else {
            error_count as f64 / sample_count as f64
        };
        let average_latency_ms = if sample_count == 0 {
            0.0
        } else {
            let total: Duration = samples.iter().map(|s| s.latency).sum();
            total.as_secs_f64() * 1000.0 / sample_count as f64
        };
        let worst_latency = samples.iter().map(|s| s.latency).max().unwrap_or_default();
        drop(samples);

        let hits = self.cache_hits.lock().unwrap();
        let cache_sample_count = hits.len();
        let cache_hit_rate = if cache_sample_count == 0 {
            0.0
        } else {
            hits.iter().filter(|h| **h).count() as f64 / cache_sample_count as f64
        };
        drop(hits);

        let last_heartbeat_secs = self.last_heartbeat.lock().unwrap().duration_since(self.started_at).as_secs() as i64;

        let (status, reason) = if error_rate >= UNHEALTHY_ERROR_RATE {
            (HealthStatus::Unhealthy, Some("critical error rate".to_string()))
        } else if error_rate >= DEGRADED_ERROR_RATE {
            (HealthStatus::Degraded, Some("elevated error rate".to_string()))
        } else if worst_latency >= self.latency_warn {
            (HealthStatus::Degraded, Some("latency above threshold".to_string()))
        } else if cache_sample_count >= CACHE_WARMUP_SAMPLES && cache_hit_rate < DEGRADED_CACHE_HIT_RATE {
            (HealthStatus::Degraded, Some("cache hit rate below threshold".to_string()))
        } else {
            (HealthStatus::Healthy, None)
        };

        HealthSnapshot {
            status,
            reason,
            average_latency_ms,
            error_rate,
            cache_hit_rate,
            sample_count,
            last_heartbeat_secs,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_reports_healthy() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.snapshot().status, HealthStatus::Healthy);
    }

    #[test]
    fn high_error_rate_reports_unhealthy() {
        let monitor = HealthMonitor::with_window(20, Duration::from_millis(200));
        for _ in 0..19 {
            monitor.record_request(Duration::from_millis(1), false);
        }
        monitor.record_request(Duration::from_millis(1), true);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.error_rate, 0.05);
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert_eq!(snapshot.reason.as_deref(), Some("critical error rate"));
    }

    #[test]
    fn moderate_error_rate_reports_degraded() {
        let monitor = HealthMonitor::with_window(100, Duration::from_millis(200));
        for _ in 0..98 {
            monitor.record_request(Duration::from_millis(1), false);
        }
        for _ in 0..2 {
            monitor.record_request(Duration::from_millis(1), true);
        }
        assert_eq!(monitor.snapshot().status, HealthStatus::Degraded);
    }

    #[test]
    fn high_latency_reports_degraded() {
        let monitor = HealthMonitor::with_window(10, Duration::from_millis(50));
        monitor.record_request(Duration::from_millis(500), false);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Degraded);
    }

    #[test]
    fn low_cache_hit_rate_after_warmup_reports_degraded() {
        let monitor = HealthMonitor::new();
        for i in 0..30 {
            monitor.record_cache_lookup(i % 5 == 0);
        }
        let snapshot = monitor.snapshot();
        assert!(snapshot.cache_hit_rate < 0.5);
        assert_eq!(snapshot.status, HealthStatus::Degraded);
    }

    #[test]
    fn window_evicts_oldest_samples() {
        let monitor = HealthMonitor::with_window(5, Duration::from_millis(200));
        for _ in 0..5 {
            monitor.record_request(Duration::from_millis(1), true);
        }
        // Five healthy requests push all the errors out of the window.
        for _ in 0..5 {
            monitor.record_request(Duration::from_millis(1), false);
        }
        assert_eq!(monitor.snapshot().error_rate, 0.0);
    }
}
