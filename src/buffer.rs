//! Multi-channel sliding-window accumulation buffer.
//!
//! Owned and mutated exclusively by the real-time thread. Analysis never
//! sees the live buffer: `extract_window` hands out an owned copy, so the
//! producer keeps writing while the worker reads.

use crate::error::{Error, Result};

/// Guard region appended past `2 × window_size` so a host block can always
/// land before a shift becomes necessary.
pub(crate) const GUARD_REGION: usize = 256;

/// Owned snapshot of one analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWindow {
    /// Per-channel samples, `window_size` each.
    pub channels: Vec<Vec<f32>>,
    /// Sample rate the window was captured at.
    pub sample_rate: f64,
    /// Absolute index (in samples since start/reset) of the first sample.
    pub start_sample: u64,
}

impl AnalysisWindow {
    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Borrowed per-channel slices, for APIs taking `&[&[f32]]`.
    pub fn channel_refs(&self) -> Vec<&[f32]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }
}

/// Details of a forced shift, forwarded to the host as a non-fatal
/// buffer-overflow notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftReport {
    /// Write position at the moment the shift was forced.
    pub write_position: usize,
    /// Samples discarded from the front of every channel ring.
    pub shift_amount: usize,
}

/// Fixed-capacity multi-channel ring with shift-and-rebase semantics.
///
/// `write_position` advances monotonically until a shift rebases it back to
/// `window_size`; `last_analysis_position` marks the end of the most
/// recently analyzed window and is advanced by the hop scheduler.
#[derive(Debug)]
pub struct SlidingWindowBuffer {
    channels: Vec<Vec<f32>>,
    window_size: usize,
    hop_size: usize,
    capacity: usize,
    write_position: usize,
    last_analysis_position: usize,
    total_appended: u64,
}

impl SlidingWindowBuffer {
    pub fn new(window_size: usize, hop_size: usize, channel_count: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Config("window_size must be > 0".into()));
        }
        if hop_size == 0 {
            return Err(Error::Config("hop_size must be > 0".into()));
        }
        if channel_count == 0 {
            return Err(Error::Config("channel_count must be > 0".into()));
        }

        let capacity = window_size * 2 + GUARD_REGION;
        Ok(Self {
            channels: vec![vec![0.0; capacity]; channel_count],
            window_size,
            hop_size,
            capacity,
            write_position: 0,
            // The first window completes once write_position reaches
            // window_size; successive window ends land at hop spacing.
            last_analysis_position: window_size.saturating_sub(hop_size),
            total_appended: 0,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// End position of the most recently analyzed window (ring-relative).
    pub fn last_analysis_position(&self) -> usize {
        self.last_analysis_position
    }

    /// Total samples per channel appended since construction or reset.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Append one frame of per-channel samples.
    ///
    /// Returns shift details when the append forced the ring to slide.
    pub fn append(&mut self, frame: &[&[f32]]) -> Result<Option<ShiftReport>> {
        if frame.len() != self.channels.len() {
            return Err(Error::InvalidInput(format!(
                "frame has {} channels, buffer expects {}",
                frame.len(),
                self.channels.len()
            )));
        }
        let frame_len = frame[0].len();
        if frame_len == 0 {
            return Err(Error::InvalidInput("frame is empty".into()));
        }
        if frame.iter().any(|ch| ch.len() != frame_len) {
            return Err(Error::InvalidInput(
                "frame channels have unequal lengths".into(),
            ));
        }
        if frame_len > self.capacity - self.window_size {
            return Err(Error::InvalidInput(format!(
                "frame of {} samples exceeds buffer headroom of {}",
                frame_len,
                self.capacity - self.window_size
            )));
        }

        let report = if self.write_position + frame_len > self.capacity {
            Some(self.shift())
        } else {
            None
        };

        for (ring, samples) in self.channels.iter_mut().zip(frame) {
            ring[self.write_position..self.write_position + frame_len].copy_from_slice(samples);
        }
        self.write_position += frame_len;
        self.total_appended += frame_len as u64;

        Ok(report)
    }

    /// Slide every channel so the trailing `window_size` samples start at
    /// offset 0, and rebase both position counters.
    fn shift(&mut self) -> ShiftReport {
        let report = ShiftReport {
            write_position: self.write_position,
            shift_amount: self.write_position - self.window_size,
        };

        for ring in &mut self.channels {
            ring.copy_within(report.shift_amount..report.write_position, 0);
        }
        self.write_position = self.window_size;
        self.last_analysis_position = self
            .last_analysis_position
            .saturating_sub(report.shift_amount);

        report
    }

    /// Advance the analysis position; called by the hop scheduler before
    /// dispatch so hop accounting is independent of analysis latency.
    pub(crate) fn advance_analysis(&mut self, amount: usize) {
        self.last_analysis_position += amount;
    }

    /// Copy out the most recent `window_size` samples of every channel.
    pub fn extract_window(&self) -> Result<Vec<Vec<f32>>> {
        if self.write_position < self.window_size {
            return Err(Error::InvalidInput(format!(
                "window not yet full: {} of {} samples",
                self.write_position, self.window_size
            )));
        }
        let start = self.write_position - self.window_size;
        Ok(self
            .channels
            .iter()
            .map(|ring| ring[start..self.write_position].to_vec())
            .collect())
    }

    /// Zero all rings and restore position counters to their initial state.
    pub fn reset(&mut self) {
        for ring in &mut self.channels {
            ring.fill(0.0);
        }
        self.write_position = 0;
        self.last_analysis_position = self.window_size.saturating_sub(self.hop_size);
        self.total_appended = 0;
    }
}
