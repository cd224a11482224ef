//! Pipeline configuration.

use crate::error::{Error, Result};
use crate::features::Feature;
use serde::{Deserialize, Serialize};

/// Configuration for an [`Analyzer`](crate::Analyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Samples per analysis window.
    pub window_size: usize,
    /// New samples required between successive triggers.
    pub hop_size: usize,
    /// Channels per delivered frame.
    pub channel_count: usize,
    /// Host sample rate in Hz.
    pub sample_rate: f64,
    /// The feature dispatched on every trigger.
    pub feature: Feature,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: 1024,
            hop_size: 512,
            channel_count: 1,
            sample_rate: 48000.0,
            feature: Feature::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::Config("window_size must be > 0".into()));
        }
        if self.hop_size == 0 {
            return Err(Error::Config("hop_size must be > 0".into()));
        }
        if self.channel_count == 0 {
            return Err(Error::Config("channel_count must be > 0".into()));
        }
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Partial update applied through the control channel.
///
/// Unset fields keep their current value. Changing `window_size` or
/// `channel_count` reinitializes the ring buffers (buffered audio is
/// discarded by design).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub window_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub channel_count: Option<usize>,
    pub sample_rate: Option<f64>,
    pub feature: Option<Feature>,
}

impl ConfigUpdate {
    /// Merge into `config`; returns true when buffers must reinitialize.
    pub(crate) fn apply(self, config: &mut AnalyzerConfig) -> bool {
        let mut reinit = false;

        if let Some(window_size) = self.window_size {
            reinit |= window_size != config.window_size;
            config.window_size = window_size;
        }
        if let Some(channel_count) = self.channel_count {
            reinit |= channel_count != config.channel_count;
            config.channel_count = channel_count;
        }
        if let Some(hop_size) = self.hop_size {
            config.hop_size = hop_size;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(feature) = self.feature {
            config.feature = feature;
        }

        reinit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut config = AnalyzerConfig::default();
        config.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.sample_rate = 1000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_update_keeps_unset_fields() {
        let mut config = AnalyzerConfig::default();
        let reinit = ConfigUpdate {
            hop_size: Some(256),
            ..ConfigUpdate::default()
        }
        .apply(&mut config);

        assert!(!reinit);
        assert_eq!(config.hop_size, 256);
        assert_eq!(config.window_size, 1024);
    }

    #[test]
    fn test_window_change_forces_reinit() {
        let mut config = AnalyzerConfig::default();
        let reinit = ConfigUpdate {
            window_size: Some(2048),
            ..ConfigUpdate::default()
        }
        .apply(&mut config);
        assert!(reinit);

        // Same value again is not a structural change.
        let reinit = ConfigUpdate {
            window_size: Some(2048),
            ..ConfigUpdate::default()
        }
        .apply(&mut config);
        assert!(!reinit);
    }
}
