//! Error types for meterbridge.

use thiserror::Error;

/// Error type for meterbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction-time parameters (window/hop/channel/sample-rate)
    /// or a feature registry missing an executor. Fatal at construction.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Malformed or empty audio supplied to a per-call API. Reported to the
    /// caller, never corrupts pipeline state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A feature executor failed. Converted to an error message at the
    /// dispatcher boundary; the pipeline continues.
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// The peer side of a control or result channel is gone.
    #[error("Channel disconnected")]
    ChannelClosed,
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
