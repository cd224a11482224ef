//! Hop-based trigger decisions.
//!
//! The scheduler advances the buffer's analysis position *before* dispatch,
//! so hop accounting never depends on how long an analysis takes. When the
//! worker is busy, due hops are skipped rather than queued; the first
//! trigger afterwards jumps straight to the most recent due hop and reports
//! how many were shed.

use crate::buffer::SlidingWindowBuffer;
use crate::error::{Error, Result};

/// Outcome of a post-append scheduling check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopDecision {
    /// Dispatch one analysis now. `dropped_hops` counts older due hops that
    /// were shed to catch up with the present.
    Trigger { dropped_hops: u64 },
    /// Not enough new data, or the window has not filled yet.
    Idle,
    /// A hop is due but an analysis is in flight; trigger skipped.
    Busy,
}

/// Decides when a freshly appended frame should start an analysis.
#[derive(Debug, Clone)]
pub struct HopScheduler {
    window_size: usize,
    hop_size: usize,
}

impl HopScheduler {
    pub fn new(window_size: usize, hop_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Config("window_size must be > 0".into()));
        }
        if hop_size == 0 {
            return Err(Error::Config("hop_size must be > 0".into()));
        }
        if hop_size > window_size {
            tracing::warn!(
                hop_size,
                window_size,
                "hop_size exceeds window_size; gaps between analyzed windows"
            );
        }
        Ok(Self {
            window_size,
            hop_size,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Check trigger conditions after a frame landed in `buffer`.
    ///
    /// On `Trigger`, the buffer's analysis position has already been
    /// advanced past the dispatched hop (and any shed ones), guaranteeing
    /// `write_position - last_analysis_position < hop_size` on return.
    pub fn on_frame_appended(
        &self,
        buffer: &mut SlidingWindowBuffer,
        in_flight: bool,
    ) -> HopDecision {
        let write_position = buffer.write_position();
        let new_data = write_position.saturating_sub(buffer.last_analysis_position());

        if new_data < self.hop_size || write_position < self.window_size {
            return HopDecision::Idle;
        }
        if in_flight {
            return HopDecision::Busy;
        }

        // Shed every hop that became due beyond the newest one.
        let surplus = (new_data - self.hop_size) / self.hop_size;
        buffer.advance_analysis((1 + surplus) * self.hop_size);

        HopDecision::Trigger {
            dropped_hops: surplus as u64,
        }
    }
}
