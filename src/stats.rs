//! Structured pipeline instrumentation.
//!
//! Counters are updated with relaxed atomics from both the real-time path
//! and the analysis worker; `snapshot` gives the host a coherent-enough view
//! for observability without any locking.

use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

/// Atomic counters for pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames: AtomicU64,
    samples: AtomicU64,
    triggers: AtomicU64,
    dropped_hops: AtomicU64,
    overflows: AtomicU64,
    dropped_messages: AtomicU64,
    analyses_completed: AtomicU64,
    analyses_failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames delivered through `append`.
    pub frames: u64,
    /// Samples per channel delivered through `append`.
    pub samples: u64,
    /// Analyses dispatched.
    pub triggers: u64,
    /// Hops that became due while an analysis was in flight and were shed.
    pub dropped_hops: u64,
    /// Ring-buffer shifts (each one produced an overflow notification).
    pub overflows: u64,
    /// Outbound messages discarded because the result channel was full.
    pub dropped_messages: u64,
    /// Analyses that completed and produced a result message.
    pub analyses_completed: u64,
    /// Analyses that failed and produced an error message.
    pub analyses_failed: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_frame(&self, sample_count: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(sample_count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped_hops(&self, count: u64) {
        self.dropped_hops.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped_message(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_completed(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.analyses_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            dropped_hops: self.dropped_hops.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            analyses_failed: self.analyses_failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        self.triggers.store(0, Ordering::Relaxed);
        self.dropped_hops.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
        self.dropped_messages.store(0, Ordering::Relaxed);
        self.analyses_completed.store(0, Ordering::Relaxed);
        self.analyses_failed.store(0, Ordering::Relaxed);
    }
}
