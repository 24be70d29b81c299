//! Atomic-counter metrics for a single transcription session.
//!
//! These counters are updated from the session task and read back by the
//! periodic stats logger; they never block and never allocate on the hot
//! path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct SessionMetrics {
    pub chunks_in: Arc<AtomicU64>,
    pub partials_out: Arc<AtomicU64>,
    pub finals_out: Arc<AtomicU64>,
    pub model_calls: Arc<AtomicU64>,
    pub fallback_retries: Arc<AtomicU64>,
    pub model_errors: Arc<AtomicU64>,
    pub malformed_chunks_dropped: Arc<AtomicU64>,
    pub hallucinations_rejected: Arc<AtomicU64>,
    pub emergency_resets: Arc<AtomicU64>,
    pub last_model_latency_ms: Arc<AtomicU64>,
    pub is_speaking: Arc<AtomicBool>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            chunks_in: Arc::new(AtomicU64::new(0)),
            partials_out: Arc::new(AtomicU64::new(0)),
            finals_out: Arc::new(AtomicU64::new(0)),
            model_calls: Arc::new(AtomicU64::new(0)),
            fallback_retries: Arc::new(AtomicU64::new(0)),
            model_errors: Arc::new(AtomicU64::new(0)),
            malformed_chunks_dropped: Arc::new(AtomicU64::new(0)),
            hallucinations_rejected: Arc::new(AtomicU64::new(0)),
            emergency_resets: Arc::new(AtomicU64::new(0)),
            last_model_latency_ms: Arc::new(AtomicU64::new(0)),
            is_speaking: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_chunk(&self) {
        self.chunks_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partial(&self) {
        self.partials_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_final(&self) {
        self.finals_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_call(&self, latency: Duration) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        self.last_model_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_fallback_retry(&self) {
        self.fallback_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_error(&self) {
        self.model_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_chunk(&self) {
        self.malformed_chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hallucination_rejected(&self) {
        self.hallucinations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_reset(&self) {
        self.emergency_resets.fetch_add(1, Ordering::Relaxed);
    }
}

/// Tracks frames-per-second over rolling one-second windows; used for the
/// periodic "pipeline running" log line.
#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let m = SessionMetrics::new();
        m.record_chunk();
        m.record_chunk();
        m.record_final();
        assert_eq!(m.chunks_in.load(Ordering::Relaxed), 2);
        assert_eq!(m.finals_out.load(Ordering::Relaxed), 1);
    }
}
