//! The wire contract between the analysis core and the host.
//!
//! Messages are immutable values delivered over a bounded channel; the
//! timestamp is a sample clock (samples appended / sample rate), so the
//! real-time path never touches wall-clock syscalls.

use crate::features::{FeatureKind, FeatureValue};
use serde::{Deserialize, Serialize};

/// A completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Which feature produced the value.
    pub kind: FeatureKind,
    pub value: FeatureValue,
    /// Absolute index of the analyzed window's first sample.
    pub window_start: u64,
    /// Sample-clock time of the window's end, in seconds.
    pub timestamp: f64,
}

/// A failed analysis; the pipeline keeps running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisError {
    pub message: String,
    pub timestamp: f64,
}

/// Details of a forced ring-buffer shift. Informational, non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverflowDetails {
    /// Write position at the moment the shift was forced.
    pub write_position: u64,
    pub window_size: usize,
    pub timestamp: f64,
}

/// Everything the pipeline sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Result(AnalysisResult),
    Error(AnalysisError),
    BufferOverflow(OverflowDetails),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_plain_values() {
        let message = OutboundMessage::Result(AnalysisResult {
            kind: FeatureKind::Rms,
            value: FeatureValue::Scalar(0.25),
            window_start: 512,
            timestamp: 0.032,
        });
        let copy = message.clone();
        assert_eq!(message, copy);
        assert!(format!("{message:?}").contains("Rms"));
    }
}
