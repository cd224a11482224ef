//! Lock-free primitives shared between the audio callback, the analysis
//! worker, and the host.

use atomic_float::AtomicF64;
use core::sync::atomic::{AtomicBool, Ordering};

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Cache-line aligned atomic f64.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }
}

impl Clone for AtomicDouble {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Lock-free storage for the latest loudness levels.
///
/// Written by the analysis worker after each LUFS dispatch, readable from
/// any thread without draining the message channel.
#[derive(Debug)]
pub struct AtomicLoudness {
    momentary: AtomicDouble,
    short_term: AtomicDouble,
    integrated: AtomicDouble,
}

/// Snapshot of [`AtomicLoudness`], all values in LUFS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessLevels {
    pub momentary: f64,
    pub short_term: f64,
    pub integrated: f64,
}

impl AtomicLoudness {
    pub fn new() -> Self {
        Self {
            momentary: AtomicDouble::new(f64::NEG_INFINITY),
            short_term: AtomicDouble::new(f64::NEG_INFINITY),
            integrated: AtomicDouble::new(f64::NEG_INFINITY),
        }
    }

    #[inline]
    pub fn get(&self) -> LoudnessLevels {
        LoudnessLevels {
            momentary: self.momentary.get(),
            short_term: self.short_term.get(),
            integrated: self.integrated.get(),
        }
    }

    #[inline]
    pub fn set(&self, momentary: f64, short_term: f64, integrated: f64) {
        self.momentary.set(momentary);
        self.short_term.set(short_term);
        self.integrated.set(integrated);
    }

    pub fn reset(&self) {
        self.set(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    }
}

impl Default for AtomicLoudness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_flag() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
        assert!(flag.swap(false));
        assert!(!flag.get());
    }

    #[test]
    fn test_atomic_loudness_defaults_to_silence() {
        let levels = AtomicLoudness::new().get();
        assert_eq!(levels.momentary, f64::NEG_INFINITY);
        assert_eq!(levels.integrated, f64::NEG_INFINITY);
    }

    #[test]
    fn test_atomic_loudness_roundtrip() {
        let loudness = AtomicLoudness::new();
        loudness.set(-12.5, -14.0, -16.25);
        let levels = loudness.get();
        assert_eq!(levels.momentary, -12.5);
        assert_eq!(levels.short_term, -14.0);
        assert_eq!(levels.integrated, -16.25);
    }
}
