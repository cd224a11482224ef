//! Real-time audio feature metering.
//!
//! A host audio engine delivers fixed-size frames on its callback thread;
//! meterbridge accumulates them into overlapping analysis windows, triggers
//! feature computation at a configurable hop interval without blocking the
//! producer, and streams results back over a bounded channel.
//!
//! # Primary API
//!
//! - [`Analyzer`] / [`AnalyzerBuilder`]: the pipeline (real-time half)
//! - [`AnalyzerHandle`]: host control, messages, counters, level peeking
//! - [`LoudnessMeter`] / [`compute_lufs`]: standalone ITU-R BS.1770 loudness
//! - [`Feature`]: the closed set of dispatchable features
//!
//! # Example
//!
//! ```
//! use meterbridge::{Analyzer, Feature, LufsOptions, OutboundMessage};
//!
//! let (mut analyzer, handle) = Analyzer::builder()
//!     .window_size(4800)
//!     .hop_size(4800)
//!     .sample_rate(48000.0)
//!     .feature(Feature::Lufs(LufsOptions::default()))
//!     .build()?;
//!
//! // Audio callback side:
//! let frame = vec![0.0f32; 4800];
//! analyzer.append(&[&frame])?;
//!
//! // Host side:
//! while let Some(message) = handle.poll() {
//!     if let OutboundMessage::Result(result) = message {
//!         println!("{:?}", result.value);
//!     }
//! }
//! # Ok::<(), meterbridge::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::{AnalyzerConfig, ConfigUpdate};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicLoudness, LoudnessLevels};

mod stats;
pub use stats::{PipelineStats, StatsSnapshot};

mod buffer;
pub use buffer::{AnalysisWindow, ShiftReport, SlidingWindowBuffer};

mod scheduler;
pub use scheduler::{HopDecision, HopScheduler};

mod message;
pub use message::{AnalysisError, AnalysisResult, OutboundMessage, OverflowDetails};

pub mod dsp;

pub mod features;
pub use features::{ChannelSelector, Feature, FeatureKind, FeatureValue};

pub mod loudness;
pub use loudness::{
    compute_lufs, ChannelMode, LoudnessMeter, LoudnessSnapshot, LufsOptions, LufsResult,
    TruePeakOptions,
};

mod dispatch;
pub use dispatch::{FeatureDispatcher, FeatureExecutor, FeatureRegistry};

mod engine;
pub use engine::{Analyzer, AnalyzerBuilder, AnalyzerHandle};
