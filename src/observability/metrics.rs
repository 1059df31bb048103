//! Thread-safe metrics collection system
//!
//! Atomic counters for request handling and collaborator health, plus
//! mutex-protected per-route counts and processing times.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Processing-time samples kept for percentile calculation
const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Request handling
    messages_received: AtomicU64,
    messages_routed: AtomicU64,
    validation_rejections: AtomicU64,
    duplicates: AtomicU64,
    clarifications_opened: AtomicU64,
    clarifications_resolved: AtomicU64,
    request_failures: AtomicU64,

    // Collaborators
    oracle_calls: AtomicU64,
    oracle_failures: AtomicU64,
    malformed_oracle_outputs: AtomicU64,
    store_failures: AtomicU64,
    persistence_failures: AtomicU64,

    routes: Mutex<BTreeMap<String, u64>>,
    processing_times: Mutex<Vec<u64>>, // milliseconds

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_routed: AtomicU64::new(0),
            validation_rejections: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            clarifications_opened: AtomicU64::new(0),
            clarifications_resolved: AtomicU64::new(0),
            request_failures: AtomicU64::new(0),
            oracle_calls: AtomicU64::new(0),
            oracle_failures: AtomicU64::new(0),
            malformed_oracle_outputs: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            routes: Mutex::new(BTreeMap::new()),
            processing_times: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Request handling
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn validation_rejected(&self) {
        self.validation_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// A message left the engine with a final route
    pub fn message_routed(&self, route: &str, duration: Duration) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut routes) = self.routes.lock() {
            *routes.entry(route.to_string()).or_insert(0) += 1;
        }
        self.record_processing_time(duration);
    }

    pub fn request_failed(&self, duration: Duration) {
        self.request_failures.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn duplicate_detected(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clarification_opened(&self) {
        self.clarifications_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clarification_resolved(&self) {
        self.clarifications_resolved.fetch_add(1, Ordering::Relaxed);
    }

    // Collaborators
    pub fn oracle_called(&self) {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn oracle_failed(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn oracle_output_malformed(&self) {
        self.malformed_oracle_outputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);
            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.messages_routed,
            &self.validation_rejections,
            &self.duplicates,
            &self.clarifications_opened,
            &self.clarifications_resolved,
            &self.request_failures,
            &self.oracle_calls,
            &self.oracle_failures,
            &self.malformed_oracle_outputs,
            &self.store_failures,
            &self.persistence_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut routes) = self.routes.lock() {
            routes.clear();
        }
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Average, p50, p95, p99 in milliseconds
    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.processing_time_statistics();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests: RequestMetrics {
                messages_received: load(&self.messages_received),
                messages_routed: load(&self.messages_routed),
                validation_rejections: load(&self.validation_rejections),
                duplicates: load(&self.duplicates),
                clarifications_opened: load(&self.clarifications_opened),
                clarifications_resolved: load(&self.clarifications_resolved),
                request_failures: load(&self.request_failures),
                routes: self
                    .routes
                    .lock()
                    .map(|routes| routes.clone())
                    .unwrap_or_default(),
                avg_processing_time_ms: avg,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            collaborators: CollaboratorMetrics {
                oracle_calls: load(&self.oracle_calls),
                oracle_failures: load(&self.oracle_failures),
                malformed_oracle_outputs: load(&self.malformed_oracle_outputs),
                store_failures: load(&self.store_failures),
                persistence_failures: load(&self.persistence_failures),
            },
            uptime_seconds: now.saturating_sub(load(&self.uptime_start)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests: RequestMetrics,
    pub collaborators: CollaboratorMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct RequestMetrics {
    pub messages_received: u64,
    pub messages_routed: u64,
    pub validation_rejections: u64,
    pub duplicates: u64,
    pub clarifications_opened: u64,
    pub clarifications_resolved: u64,
    pub request_failures: u64,
    pub routes: BTreeMap<String, u64>,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct CollaboratorMetrics {
    pub oracle_calls: u64,
    pub oracle_failures: u64,
    pub malformed_oracle_outputs: u64,
    pub store_failures: u64,
    pub persistence_failures: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
