//! ITU-R BS.1770 loudness measurement (LUFS).
//!
//! [`LoudnessMeter`] is the streaming engine: K-weighting filters with
//! per-channel state, incremental 400 ms block energies at 75 % overlap,
//! and gated aggregation on demand. [`compute_lufs`] is the one-shot batch
//! query built on top of it, so chunked streaming and offline analysis
//! produce identical numbers.

mod gating;
mod kweight;

pub use gating::{ABSOLUTE_GATE_LUFS, RELATIVE_GATE_LU};

use crate::dsp::{amp_to_db, oversample, sanitize, BiquadCoeffs, BiquadState, Interpolation};
use crate::error::{Error, Result};
use gating::{
    gated_loudness, loudness_from_energy, loudness_range, ungated_loudness, BLOCK_SIZE_MS,
};
use kweight::design_k_weighting;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A gating block spans four segments (75 % overlap, hop = block / 4).
const SEGMENTS_PER_BLOCK: usize = 4;
/// A short-term window spans 3000 ms = 30 segments of 100 ms.
const SEGMENTS_PER_SHORT_TERM: usize = 30;

/// Which input channels participate in the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// First channel only.
    Mono,
    /// First two channels, weight 1.0 each, summed (not averaged).
    Stereo,
}

/// True-peak estimation settings.
///
/// `oversampling == 1` reports the plain per-channel sample peak. Factors
/// 2/4/8 interpolate between samples first; the sinc kernel approximates a
/// reconstruction filter but is not a certified BS.1770 Annex 2 polyphase
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruePeakOptions {
    pub oversampling: usize,
    pub interpolation: Interpolation,
}

impl Default for TruePeakOptions {
    fn default() -> Self {
        Self {
            oversampling: 1,
            interpolation: Interpolation::Sinc,
        }
    }
}

/// Options for [`compute_lufs`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LufsOptions {
    /// `None` selects stereo when two or more channels are present.
    pub channel_mode: Option<ChannelMode>,
    /// Apply absolute and relative gating to integrated loudness.
    pub gated: bool,
    /// Produce the momentary (400 ms) series.
    pub momentary: bool,
    /// Produce the short-term (3000 ms) series.
    pub short_term: bool,
    /// Produce loudness range and its percentile statistics.
    pub loudness_range: bool,
    /// Produce per-channel true peak in dBFS.
    pub true_peak: Option<TruePeakOptions>,
}

impl Default for LufsOptions {
    fn default() -> Self {
        Self {
            channel_mode: None,
            gated: true,
            momentary: false,
            short_term: false,
            loudness_range: false,
            true_peak: None,
        }
    }
}

/// Percentiles backing a loudness-range figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessStatistics {
    pub percentile_10: f64,
    pub percentile_95: f64,
}

/// Result of a LUFS measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LufsResult {
    /// Integrated loudness in LUFS (`-inf` for silence).
    pub integrated: f64,
    /// Momentary loudness series, one value per 100 ms hop.
    pub momentary: Option<Vec<f64>>,
    /// Short-term loudness series, one value per 100 ms hop.
    pub short_term: Option<Vec<f64>>,
    /// Loudness range in LU.
    pub loudness_range: Option<f64>,
    /// Percentiles behind `loudness_range`.
    pub statistics: Option<LoudnessStatistics>,
    /// Per-channel true peak in dBFS.
    pub true_peak: Option<Vec<f64>>,
}

/// Instantaneous view of a streaming measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessSnapshot {
    pub integrated: f64,
    pub momentary: f64,
    pub short_term: f64,
}

/// Streaming BS.1770 loudness meter.
///
/// Filter state persists across `process` calls, so feeding a signal in
/// arbitrary chunks yields the same measurement as one batch pass. Not
/// shareable across streams; clone-free single ownership per stream.
#[derive(Debug)]
pub struct LoudnessMeter {
    sample_rate: f64,
    gated: bool,
    coeffs: [BiquadCoeffs; 2],
    /// Per-channel state for both cascade stages.
    filters: Vec<[BiquadState; 2]>,
    /// Samples per 100 ms energy segment.
    segment_len: usize,
    /// Per-channel sum of squared K-weighted samples in the open segment.
    segment_accum: Vec<f64>,
    segment_fill: usize,
    /// Combined per-segment mean-square energies, newest last.
    segments: VecDeque<f64>,
    /// Finite 400 ms block loudness values (also the momentary series).
    blocks: VecDeque<f64>,
    /// Finite short-term loudness values at segment spacing.
    short_term_history: VecDeque<f64>,
    /// History cap in blocks; `None` keeps everything (batch mode).
    max_history_blocks: Option<usize>,
    /// Per-channel running absolute sample peak.
    sample_peak: Vec<f64>,
    total_samples: u64,
}

impl LoudnessMeter {
    /// Create a meter for `channel_count` channels at `sample_rate`.
    ///
    /// `gated` controls whether [`LoudnessMeter::integrated`] applies the
    /// absolute/relative gates or plain energy averaging.
    pub fn new(sample_rate: f64, channel_count: usize, gated: bool) -> Result<Self> {
        if channel_count == 0 {
            return Err(Error::Config("channel_count must be > 0".into()));
        }
        let coeffs = design_k_weighting(sample_rate)?;
        let segment_len =
            ((BLOCK_SIZE_MS / 1000.0 * sample_rate) as usize / SEGMENTS_PER_BLOCK).max(1);

        Ok(Self {
            sample_rate,
            gated,
            coeffs,
            filters: vec![[BiquadState::new(); 2]; channel_count],
            segment_len,
            segment_accum: vec![0.0; channel_count],
            segment_fill: 0,
            segments: VecDeque::with_capacity(SEGMENTS_PER_SHORT_TERM + 1),
            blocks: VecDeque::new(),
            short_term_history: VecDeque::new(),
            max_history_blocks: None,
            sample_peak: vec![0.0; channel_count],
            total_samples: 0,
        })
    }

    /// Bound retained block history to roughly `ms` of audio; older blocks
    /// fall out of the integrated measurement (streaming trim).
    pub fn with_max_history_ms(mut self, ms: f64) -> Self {
        let blocks = (ms / 1000.0 * self.sample_rate / self.segment_len as f64).ceil() as usize;
        self.max_history_blocks = Some(blocks.max(SEGMENTS_PER_BLOCK));
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.filters.len()
    }

    pub fn is_gated(&self) -> bool {
        self.gated
    }

    /// Total samples per channel consumed since construction or reset.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Feed one chunk of per-channel samples.
    pub fn process(&mut self, channels: &[&[f32]]) -> Result<()> {
        if channels.len() != self.filters.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} channels, got {}",
                self.filters.len(),
                channels.len()
            )));
        }
        let len = channels[0].len();
        if len == 0 {
            return Err(Error::InvalidInput("empty audio chunk".into()));
        }
        if channels.iter().any(|ch| ch.len() != len) {
            return Err(Error::InvalidInput(
                "channels have unequal lengths".into(),
            ));
        }

        for i in 0..len {
            for (ch, channel) in channels.iter().enumerate() {
                let raw = sanitize(channel[i]);
                if raw.abs() > self.sample_peak[ch] {
                    self.sample_peak[ch] = raw.abs();
                }

                let [stage1, stage2] = &mut self.filters[ch];
                let shelved = stage1.process_sample(&self.coeffs[0], channel[i]);
                let weighted = stage2.process_sample(&self.coeffs[1], shelved as f32);
                self.segment_accum[ch] += weighted * weighted;
            }
            self.segment_fill += 1;
            if self.segment_fill == self.segment_len {
                self.finalize_segment();
            }
        }
        self.total_samples += len as u64;

        Ok(())
    }

    fn finalize_segment(&mut self) {
        let energy: f64 = self
            .segment_accum
            .iter()
            .map(|sum| sum / self.segment_len as f64)
            .sum();
        self.segment_accum.fill(0.0);
        self.segment_fill = 0;

        self.segments.push_back(energy);
        while self.segments.len() > SEGMENTS_PER_SHORT_TERM {
            self.segments.pop_front();
        }

        if self.segments.len() >= SEGMENTS_PER_BLOCK {
            let block = loudness_from_energy(self.window_energy(SEGMENTS_PER_BLOCK));
            if block.is_finite() {
                self.blocks.push_back(block);
            }
        }
        if self.segments.len() >= SEGMENTS_PER_SHORT_TERM {
            let short_term = loudness_from_energy(self.window_energy(SEGMENTS_PER_SHORT_TERM));
            if short_term.is_finite() {
                self.short_term_history.push_back(short_term);
            }
        }

        if let Some(cap) = self.max_history_blocks {
            while self.blocks.len() > cap {
                self.blocks.pop_front();
            }
            while self.short_term_history.len() > cap {
                self.short_term_history.pop_front();
            }
        }
    }

    /// Mean energy over the newest `count` segments.
    fn window_energy(&self, count: usize) -> f64 {
        let available = self.segments.len().min(count);
        if available == 0 {
            return 0.0;
        }
        let sum: f64 = self.segments.iter().rev().take(available).sum();
        sum / available as f64
    }

    /// Momentary loudness: the newest 400 ms window, `-inf` until filled.
    pub fn momentary(&self) -> f64 {
        if self.segments.len() < SEGMENTS_PER_BLOCK {
            return f64::NEG_INFINITY;
        }
        loudness_from_energy(self.window_energy(SEGMENTS_PER_BLOCK))
    }

    /// Short-term loudness: the newest 3000 ms window, `-inf` until filled.
    pub fn short_term(&self) -> f64 {
        if self.segments.len() < SEGMENTS_PER_SHORT_TERM {
            return f64::NEG_INFINITY;
        }
        loudness_from_energy(self.window_energy(SEGMENTS_PER_SHORT_TERM))
    }

    /// Integrated loudness over retained history, gated per construction.
    pub fn integrated(&self) -> f64 {
        let blocks: Vec<f64> = self.blocks.iter().copied().collect();
        if self.gated {
            gated_loudness(&blocks)
        } else {
            ungated_loudness(&blocks)
        }
    }

    /// Momentary series (one value per 100 ms hop, finite values only).
    pub fn momentary_history(&self) -> Vec<f64> {
        self.blocks.iter().copied().collect()
    }

    /// Short-term series (one value per 100 ms hop, finite values only).
    pub fn short_term_series(&self) -> Vec<f64> {
        self.short_term_history.iter().copied().collect()
    }

    /// Loudness range over the retained short-term series.
    pub fn loudness_range(&self) -> Option<(f64, f64, f64)> {
        let series: Vec<f64> = self.short_term_history.iter().copied().collect();
        loudness_range(&series)
    }

    /// Per-channel absolute sample peak in dBFS.
    pub fn sample_peak_db(&self) -> Vec<f64> {
        self.sample_peak
            .iter()
            .map(|&peak| amp_to_db(peak, 1.0))
            .collect()
    }

    /// Current integrated/momentary/short-term values.
    pub fn snapshot(&self) -> LoudnessSnapshot {
        LoudnessSnapshot {
            integrated: self.integrated(),
            momentary: self.momentary(),
            short_term: self.short_term(),
        }
    }

    /// Clear filter state and all retained history.
    pub fn reset(&mut self) {
        for states in &mut self.filters {
            states[0].reset();
            states[1].reset();
        }
        self.segment_accum.fill(0.0);
        self.segment_fill = 0;
        self.segments.clear();
        self.blocks.clear();
        self.short_term_history.clear();
        self.sample_peak.fill(0.0);
        self.total_samples = 0;
    }
}

/// Select the channels a measurement runs over.
fn resolve_channels<'a>(channels: &'a [&'a [f32]], mode: ChannelMode) -> Vec<&'a [f32]> {
    match mode {
        ChannelMode::Mono => vec![channels[0]],
        ChannelMode::Stereo => {
            if channels.len() >= 2 {
                vec![channels[0], channels[1]]
            } else {
                vec![channels[0]]
            }
        }
    }
}

/// One-shot LUFS measurement over a complete multi-channel buffer.
pub fn compute_lufs(
    channels: &[&[f32]],
    sample_rate: f64,
    options: &LufsOptions,
) -> Result<LufsResult> {
    if channels.is_empty() {
        return Err(Error::InvalidInput("no channels to process".into()));
    }
    if channels[0].is_empty() {
        return Err(Error::InvalidInput("zero-length audio".into()));
    }

    let mode = options.channel_mode.unwrap_or(if channels.len() >= 2 {
        ChannelMode::Stereo
    } else {
        ChannelMode::Mono
    });
    let selected = resolve_channels(channels, mode);

    let mut meter = LoudnessMeter::new(sample_rate, selected.len(), options.gated)?;
    meter.process(&selected)?;

    let mut result = LufsResult {
        integrated: meter.integrated(),
        momentary: None,
        short_term: None,
        loudness_range: None,
        statistics: None,
        true_peak: None,
    };

    if options.momentary {
        result.momentary = Some(meter.momentary_history());
    }
    if options.short_term {
        result.short_term = Some(meter.short_term_series());
    }
    if options.loudness_range {
        if let Some((range, p10, p95)) = meter.loudness_range() {
            result.loudness_range = Some(range);
            result.statistics = Some(LoudnessStatistics {
                percentile_10: p10,
                percentile_95: p95,
            });
        }
    }
    if let Some(tp) = options.true_peak {
        result.true_peak = Some(if tp.oversampling <= 1 {
            meter.sample_peak_db()
        } else {
            selected
                .iter()
                .map(|channel| {
                    let upsampled = oversample(channel, tp.oversampling, tp.interpolation)?;
                    let peak = upsampled.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
                    Ok(amp_to_db(peak, 1.0))
                })
                .collect::<Result<Vec<f64>>>()?
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(frequency: f64, amplitude: f64, sample_rate: f64, seconds: f64) -> Vec<f32> {
        let count = (sample_rate * seconds) as usize;
        (0..count)
            .map(|i| {
                (amplitude * (2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate).sin())
                    as f32
            })
            .collect()
    }

    #[test]
    fn test_meter_rejects_zero_channels() {
        assert!(LoudnessMeter::new(48000.0, 0, true).is_err());
    }

    #[test]
    fn test_compute_lufs_rejects_empty_input() {
        assert!(compute_lufs(&[], 48000.0, &LufsOptions::default()).is_err());
        let empty: &[f32] = &[];
        assert!(compute_lufs(&[empty], 48000.0, &LufsOptions::default()).is_err());
    }

    #[test]
    fn test_silence_is_negative_infinity() {
        let silence = vec![0.0f32; 48000 * 2];
        let result = compute_lufs(&[&silence], 48000.0, &LufsOptions::default()).unwrap();
        assert_eq!(result.integrated, f64::NEG_INFINITY);
        assert!(!result.integrated.is_nan());
    }

    #[test]
    fn test_full_scale_997hz_sine_mono_reference() {
        // BS.1770 reference: a full-scale 997 Hz sine measures -3.01 LUFS.
        // The official 48 kHz tables carry +0.691 dB at 997 Hz, cancelled
        // by the -0.691 constant, leaving 10·log10(0.5).
        let tone = sine(997.0, 1.0, 48000.0, 4.0);
        let result = compute_lufs(&[&tone], 48000.0, &LufsOptions::default()).unwrap();
        assert_relative_eq!(result.integrated, -3.01, epsilon = 0.1);
    }

    #[test]
    fn test_full_scale_997hz_sine_stereo_reference() {
        // Stereo channels sum (not average): twice the mono energy,
        // +3.01 dB, giving ≈ 0.0 LUFS for a full-scale tone on both.
        let tone = sine(997.0, 1.0, 48000.0, 4.0);
        let result = compute_lufs(&[&tone, &tone], 48000.0, &LufsOptions::default()).unwrap();
        assert_relative_eq!(result.integrated, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_minus_20dbfs_sine_mono() {
        let tone = sine(997.0, 0.1, 48000.0, 4.0);
        let result = compute_lufs(&[&tone], 48000.0, &LufsOptions::default()).unwrap();
        assert_relative_eq!(result.integrated, -23.01, epsilon = 0.1);
    }

    #[test]
    fn test_streaming_matches_batch() {
        let tone = sine(440.0, 0.5, 48000.0, 3.0);
        let batch = compute_lufs(&[&tone], 48000.0, &LufsOptions::default()).unwrap();

        let mut meter = LoudnessMeter::new(48000.0, 1, true).unwrap();
        for chunk in tone.chunks(128) {
            meter.process(&[chunk]).unwrap();
        }
        assert_eq!(meter.integrated(), batch.integrated);
    }

    #[test]
    fn test_reset_replay_is_bit_identical() {
        let tone = sine(330.0, 0.7, 48000.0, 2.0);
        let mut meter = LoudnessMeter::new(48000.0, 1, true).unwrap();

        for chunk in tone.chunks(480) {
            meter.process(&[chunk]).unwrap();
        }
        let first = meter.snapshot();

        meter.reset();
        for chunk in tone.chunks(480) {
            meter.process(&[chunk]).unwrap();
        }
        let second = meter.snapshot();

        assert_eq!(first, second);
    }

    #[test]
    fn test_momentary_needs_full_window() {
        let tone = sine(440.0, 0.5, 48000.0, 0.1);
        let mut meter = LoudnessMeter::new(48000.0, 1, true).unwrap();
        meter.process(&[&tone]).unwrap();
        assert_eq!(meter.momentary(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_short_term_series_and_range() {
        // Loud then soft program produces a measurable loudness range.
        let sr = 48000.0;
        let mut signal = sine(440.0, 0.8, sr, 5.0);
        signal.extend(sine(440.0, 0.05, sr, 5.0));

        let options = LufsOptions {
            short_term: true,
            loudness_range: true,
            ..LufsOptions::default()
        };
        let result = compute_lufs(&[&signal], sr, &options).unwrap();
        let series = result.short_term.unwrap();
        assert!(!series.is_empty());
        let range = result.loudness_range.unwrap();
        assert!(range > 10.0, "expected a wide range, got {range}");
        let stats = result.statistics.unwrap();
        assert!(stats.percentile_95 > stats.percentile_10);
    }

    #[test]
    fn test_true_peak_sample_mode() {
        let tone = sine(440.0, 0.5, 48000.0, 1.0);
        let options = LufsOptions {
            true_peak: Some(TruePeakOptions::default()),
            ..LufsOptions::default()
        };
        let result = compute_lufs(&[&tone], 48000.0, &options).unwrap();
        let peaks = result.true_peak.unwrap();
        assert_eq!(peaks.len(), 1);
        // 0.5 amplitude ≈ -6.02 dBFS.
        assert_relative_eq!(peaks[0], -6.02, epsilon = 0.05);
    }

    #[test]
    fn test_true_peak_oversampled_not_below_sample_peak() {
        let tone = sine(11975.0, 0.9, 48000.0, 0.5);
        let sample = compute_lufs(
            &[&tone],
            48000.0,
            &LufsOptions {
                true_peak: Some(TruePeakOptions::default()),
                ..LufsOptions::default()
            },
        )
        .unwrap();
        let oversampled = compute_lufs(
            &[&tone],
            48000.0,
            &LufsOptions {
                true_peak: Some(TruePeakOptions {
                    oversampling: 4,
                    interpolation: Interpolation::Sinc,
                }),
                ..LufsOptions::default()
            },
        )
        .unwrap();
        let sample_peak = sample.true_peak.unwrap()[0];
        let true_peak = oversampled.true_peak.unwrap()[0];
        assert!(true_peak >= sample_peak - 0.2);
    }

    #[test]
    fn test_gated_below_ungated_for_dynamic_program() {
        // Quiet passages pull the ungated mean down; gating excludes them.
        let sr = 48000.0;
        let mut signal = sine(440.0, 0.8, sr, 4.0);
        signal.extend(sine(440.0, 0.0008, sr, 4.0));

        let gated = compute_lufs(&[&signal], sr, &LufsOptions::default()).unwrap();
        let ungated = compute_lufs(
            &[&signal],
            sr,
            &LufsOptions {
                gated: false,
                ..LufsOptions::default()
            },
        )
        .unwrap();
        assert!(gated.integrated > ungated.integrated);
    }

    #[test]
    fn test_history_trim_bounds_memory() {
        let sr = 48000.0;
        let tone = sine(440.0, 0.5, sr, 1.0);
        let mut meter = LoudnessMeter::new(sr, 1, true)
            .unwrap()
            .with_max_history_ms(2000.0);
        for _ in 0..10 {
            for chunk in tone.chunks(4800) {
                meter.process(&[chunk]).unwrap();
            }
        }
        // 2 s of history at 100 ms hops, plus the ceil'd boundary block.
        assert!(meter.momentary_history().len() <= 21);
    }
}
