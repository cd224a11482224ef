//! Single-pass time-domain features.

use crate::buffer::AnalysisWindow;
use crate::dsp::{amp_to_db, sanitize};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// RMS is treated as zero below this floor when forming ratios.
const RMS_FLOOR: f64 = 1e-10;

/// Which channel a scalar feature reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelector {
    /// A single channel by index.
    Index(usize),
    /// Average of all channels.
    Mix,
}

impl Default for ChannelSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

/// Options for the RMS feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsOptions {
    pub channel: ChannelSelector,
    /// Report in dB relative to `reference` instead of linear amplitude.
    pub as_db: bool,
    pub reference: f64,
}

impl Default for RmsOptions {
    fn default() -> Self {
        Self {
            channel: ChannelSelector::default(),
            as_db: false,
            reference: 1.0,
        }
    }
}

/// Options for the peak-amplitude feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakOptions {
    pub channel: ChannelSelector,
    pub as_db: bool,
    pub reference: f64,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            channel: ChannelSelector::default(),
            as_db: false,
            reference: 1.0,
        }
    }
}

/// Options for the zero-crossing-rate feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZeroCrossingOptions {
    pub channel: ChannelSelector,
}

/// Options for the crest-factor feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrestFactorOptions {
    pub channel: ChannelSelector,
}

/// Resolve a selector against the window's channels.
fn resolve_channel(window: &AnalysisWindow, selector: ChannelSelector) -> Result<Vec<f64>> {
    if window.channel_count() == 0 || window.is_empty() {
        return Err(Error::InvalidInput("no samples to analyze".into()));
    }
    match selector {
        ChannelSelector::Index(index) => window
            .channels
            .get(index)
            .map(|ch| ch.iter().map(|&x| sanitize(x)).collect())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "channel {index} out of range ({} channels)",
                    window.channel_count()
                ))
            }),
        ChannelSelector::Mix => {
            let count = window.channel_count() as f64;
            let len = window.len();
            let mut mixed = vec![0.0f64; len];
            for channel in &window.channels {
                for (acc, &x) in mixed.iter_mut().zip(channel) {
                    *acc += sanitize(x);
                }
            }
            for value in &mut mixed {
                *value /= count;
            }
            Ok(mixed)
        }
    }
}

fn linear_rms(samples: &[f64]) -> f64 {
    let sum_sq: f64 = samples.iter().map(|&x| x * x).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

fn linear_peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()))
}

/// Root-mean-square amplitude of the selected channel.
pub fn rms(window: &AnalysisWindow, options: &RmsOptions) -> Result<f64> {
    let samples = resolve_channel(window, options.channel)?;
    let value = linear_rms(&samples);
    Ok(if options.as_db {
        amp_to_db(value, options.reference)
    } else {
        value
    })
}

/// Absolute peak amplitude of the selected channel.
pub fn peak_amplitude(window: &AnalysisWindow, options: &PeakOptions) -> Result<f64> {
    let samples = resolve_channel(window, options.channel)?;
    let value = linear_peak(&samples);
    Ok(if options.as_db {
        amp_to_db(value, options.reference)
    } else {
        value
    })
}

/// Zero-crossing rate as crossings per sample interval (0..=1).
pub fn zero_crossing_rate(window: &AnalysisWindow, options: &ZeroCrossingOptions) -> Result<f64> {
    let samples = resolve_channel(window, options.channel)?;
    if samples.len() < 2 {
        return Ok(0.0);
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    Ok(crossings as f64 / (samples.len() - 1) as f64)
}

/// Crest factor (peak over RMS) in dB. Silence yields `+inf`, the
/// degenerate "all headroom" answer rather than an error.
pub fn crest_factor(window: &AnalysisWindow, options: &CrestFactorOptions) -> Result<f64> {
    let samples = resolve_channel(window, options.channel)?;
    let rms = linear_rms(&samples);
    if rms <= RMS_FLOOR {
        return Ok(f64::INFINITY);
    }
    Ok(amp_to_db(linear_peak(&samples) / rms, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn window(channels: Vec<Vec<f32>>) -> AnalysisWindow {
        AnalysisWindow {
            channels,
            sample_rate: 48000.0,
            start_sample: 0,
        }
    }

    fn sine_window(amplitude: f32, len: usize) -> AnalysisWindow {
        let samples: Vec<f32> = (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * i as f32 / 64.0).sin())
            .collect();
        window(vec![samples])
    }

    #[test]
    fn test_rms_of_sine() {
        let w = sine_window(0.5, 4096);
        let value = rms(&w, &RmsOptions::default()).unwrap();
        assert_relative_eq!(value, 0.5 / std::f64::consts::SQRT_2, epsilon = 1e-3);
    }

    #[test]
    fn test_rms_in_db() {
        let w = window(vec![vec![1.0; 256]]);
        let options = RmsOptions {
            as_db: true,
            ..RmsOptions::default()
        };
        assert_relative_eq!(rms(&w, &options).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_peak_tracks_largest_magnitude() {
        let w = window(vec![vec![0.1, -0.8, 0.3, 0.0]]);
        assert_relative_eq!(
            peak_amplitude(&w, &PeakOptions::default()).unwrap(),
            0.8,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_mix_selector_averages_channels() {
        let w = window(vec![vec![1.0; 128], vec![0.0; 128]]);
        let options = RmsOptions {
            channel: ChannelSelector::Mix,
            ..RmsOptions::default()
        };
        assert_relative_eq!(rms(&w, &options).unwrap(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_channel_out_of_range() {
        let w = window(vec![vec![0.0; 16]]);
        let options = RmsOptions {
            channel: ChannelSelector::Index(2),
            ..RmsOptions::default()
        };
        assert!(rms(&w, &options).is_err());
    }

    #[test]
    fn test_zero_crossing_rate_of_alternating_signal() {
        let samples: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let w = window(vec![samples]);
        let rate = zero_crossing_rate(&w, &ZeroCrossingOptions::default()).unwrap();
        assert_relative_eq!(rate, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_crossing_rate_of_dc() {
        let w = window(vec![vec![0.7; 64]]);
        let rate = zero_crossing_rate(&w, &ZeroCrossingOptions::default()).unwrap();
        assert_relative_eq!(rate, 0.0);
    }

    #[test]
    fn test_crest_factor_of_sine() {
        let w = sine_window(0.5, 4096);
        let crest = crest_factor(&w, &CrestFactorOptions::default()).unwrap();
        // Sine crest factor is sqrt(2) ≈ 3.01 dB.
        assert_relative_eq!(crest, 3.01, epsilon = 0.02);
    }

    #[test]
    fn test_crest_factor_of_silence_is_infinite() {
        let w = window(vec![vec![0.0; 64]]);
        assert_eq!(
            crest_factor(&w, &CrestFactorOptions::default()).unwrap(),
            f64::INFINITY
        );
    }
}
