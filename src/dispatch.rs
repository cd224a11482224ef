//! Feature execution: registry lookup, invocation, guard discipline.

use crate::buffer::AnalysisWindow;
use crate::error::{Error, Result};
use crate::features::{time, Feature, FeatureKind, FeatureValue};
use crate::loudness::{ChannelMode, LoudnessMeter, LufsOptions, LufsResult};

/// A runnable feature implementation.
///
/// Executors may keep state across windows (the LUFS executor does); the
/// dispatcher calls `reset` when the host resets the pipeline.
pub trait FeatureExecutor: Send {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue>;

    fn reset(&mut self) {}
}

fn mismatch(expected: &str) -> Error {
    Error::Analysis(format!("executor received a non-{expected} feature"))
}

struct RmsExecutor;

impl FeatureExecutor for RmsExecutor {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        match feature {
            Feature::Rms(options) => time::rms(window, options).map(FeatureValue::Scalar),
            _ => Err(mismatch("rms")),
        }
    }
}

struct PeakExecutor;

impl FeatureExecutor for PeakExecutor {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        match feature {
            Feature::Peak(options) => {
                time::peak_amplitude(window, options).map(FeatureValue::Scalar)
            }
            _ => Err(mismatch("peak")),
        }
    }
}

struct ZeroCrossingExecutor;

impl FeatureExecutor for ZeroCrossingExecutor {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        match feature {
            Feature::ZeroCrossing(options) => {
                time::zero_crossing_rate(window, options).map(FeatureValue::Scalar)
            }
            _ => Err(mismatch("zero_crossing")),
        }
    }
}

struct CrestFactorExecutor;

impl FeatureExecutor for CrestFactorExecutor {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        match feature {
            Feature::CrestFactor(options) => {
                time::crest_factor(window, options).map(FeatureValue::Scalar)
            }
            _ => Err(mismatch("crest_factor")),
        }
    }
}

/// Streaming LUFS execution over successive windows.
///
/// The meter persists across windows so momentary/short-term/integrated
/// values accumulate like a broadcast meter; it is rebuilt only when the
/// sample rate, channel mode, or gating setting changes.
struct LufsExecutor {
    meter: Option<LoudnessMeter>,
    key: Option<(u64, ChannelMode, bool)>,
    /// History bound applied to streaming meters.
    max_history_ms: f64,
}

impl LufsExecutor {
    /// Matches the realtime executor's measurement horizon.
    const DEFAULT_MAX_HISTORY_MS: f64 = 60_000.0;

    fn new() -> Self {
        Self {
            meter: None,
            key: None,
            max_history_ms: Self::DEFAULT_MAX_HISTORY_MS,
        }
    }

    fn resolve_mode(window: &AnalysisWindow, options: &LufsOptions) -> ChannelMode {
        options.channel_mode.unwrap_or(if window.channel_count() >= 2 {
            ChannelMode::Stereo
        } else {
            ChannelMode::Mono
        })
    }

    fn select_channels<'a>(window: &'a AnalysisWindow, mode: ChannelMode) -> Vec<&'a [f32]> {
        let refs = window.channel_refs();
        match mode {
            ChannelMode::Mono => vec![refs[0]],
            ChannelMode::Stereo => {
                // A mono input in stereo mode measures the one channel on
                // both legs.
                let right = refs.get(1).copied().unwrap_or(refs[0]);
                vec![refs[0], right]
            }
        }
    }

    fn snapshot_result(
        meter: &LoudnessMeter,
        channels: &[&[f32]],
        options: &LufsOptions,
    ) -> Result<LufsResult> {
        let snapshot = meter.snapshot();
        let mut result = LufsResult {
            integrated: snapshot.integrated,
            momentary: None,
            short_term: None,
            loudness_range: None,
            statistics: None,
            true_peak: None,
        };

        if options.momentary {
            result.momentary = Some(vec![snapshot.momentary]);
        }
        if options.short_term || options.loudness_range {
            result.short_term = Some(vec![snapshot.short_term]);
        }
        if options.loudness_range {
            if let Some((range, p10, p95)) = meter.loudness_range() {
                result.loudness_range = Some(range);
                result.statistics = Some(crate::loudness::LoudnessStatistics {
                    percentile_10: p10,
                    percentile_95: p95,
                });
            }
        }
        if let Some(tp) = options.true_peak {
            // Window-local peak, not the running program peak.
            result.true_peak = Some(
                channels
                    .iter()
                    .map(|channel| {
                        if tp.oversampling <= 1 {
                            let peak = channel
                                .iter()
                                .filter(|x| x.is_finite())
                                .fold(0.0f64, |acc, &x| acc.max(x.abs() as f64));
                            Ok(crate::dsp::amp_to_db(peak, 1.0))
                        } else {
                            let upsampled =
                                crate::dsp::oversample(channel, tp.oversampling, tp.interpolation)?;
                            let peak =
                                upsampled.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
                            Ok(crate::dsp::amp_to_db(peak, 1.0))
                        }
                    })
                    .collect::<Result<Vec<f64>>>()?,
            );
        }

        Ok(result)
    }
}

impl FeatureExecutor for LufsExecutor {
    fn execute(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        let Feature::Lufs(options) = feature else {
            return Err(mismatch("lufs"));
        };

        let mode = Self::resolve_mode(window, options);
        let key = (window.sample_rate.to_bits(), mode, options.gated);
        if self.key != Some(key) {
            let channel_count = match mode {
                ChannelMode::Mono => 1,
                ChannelMode::Stereo => 2,
            };
            self.meter = Some(
                LoudnessMeter::new(window.sample_rate, channel_count, options.gated)?
                    .with_max_history_ms(self.max_history_ms),
            );
            self.key = Some(key);
        }

        let channels = Self::select_channels(window, mode);
        let meter = self.meter.as_mut().expect("meter built above");
        meter.process(&channels)?;

        Self::snapshot_result(meter, &channels, options).map(FeatureValue::Loudness)
    }

    fn reset(&mut self) {
        if let Some(meter) = &mut self.meter {
            meter.reset();
        }
    }
}

/// Explicit mapping from feature kinds to executors.
///
/// Passed to the dispatcher at construction; a missing entry is a
/// configuration error there, never a silent runtime fallback.
pub struct FeatureRegistry {
    executors: Vec<Option<Box<dyn FeatureExecutor>>>,
}

impl FeatureRegistry {
    /// An empty registry. Useful for building a fully custom set.
    pub fn empty() -> Self {
        let mut executors = Vec::with_capacity(FeatureKind::ALL.len());
        executors.resize_with(FeatureKind::ALL.len(), || None);
        Self { executors }
    }

    /// Registry with the built-in executor for every kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.set(FeatureKind::Rms, Box::new(RmsExecutor));
        registry.set(FeatureKind::Peak, Box::new(PeakExecutor));
        registry.set(FeatureKind::ZeroCrossing, Box::new(ZeroCrossingExecutor));
        registry.set(FeatureKind::CrestFactor, Box::new(CrestFactorExecutor));
        registry.set(FeatureKind::Lufs, Box::new(LufsExecutor::new()));
        registry
    }

    /// Install (or replace) the executor for `kind`.
    pub fn set(&mut self, kind: FeatureKind, executor: Box<dyn FeatureExecutor>) {
        self.executors[kind.index()] = Some(executor);
    }

    /// Ensure every kind has an executor.
    pub fn validate(&self) -> Result<()> {
        for kind in FeatureKind::ALL {
            if self.executors[kind.index()].is_none() {
                return Err(Error::Config(format!(
                    "feature registry has no executor for '{}'",
                    kind.name()
                )));
            }
        }
        Ok(())
    }

    fn get_mut(&mut self, kind: FeatureKind) -> &mut dyn FeatureExecutor {
        self.executors[kind.index()]
            .as_mut()
            .expect("registry validated at dispatcher construction")
            .as_mut()
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Routes extracted windows to the configured feature executor.
pub struct FeatureDispatcher {
    registry: FeatureRegistry,
}

impl std::fmt::Debug for FeatureDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDispatcher").finish_non_exhaustive()
    }
}

impl FeatureDispatcher {
    /// Validates the registry up front; a missing executor fails here.
    pub fn new(registry: FeatureRegistry) -> Result<Self> {
        registry.validate()?;
        Ok(Self { registry })
    }

    /// Run `feature` over `window`.
    pub fn dispatch(&mut self, window: &AnalysisWindow, feature: &Feature) -> Result<FeatureValue> {
        self.registry.get_mut(feature.kind()).execute(window, feature)
    }

    /// Reset stateful executors (streaming meters).
    pub fn reset(&mut self) {
        for executor in self.registry.executors.iter_mut().flatten() {
            executor.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::RmsOptions;

    fn window_of(value: f32, len: usize, channels: usize) -> AnalysisWindow {
        AnalysisWindow {
            channels: vec![vec![value; len]; channels],
            sample_rate: 48000.0,
            start_sample: 0,
        }
    }

    #[test]
    fn test_incomplete_registry_fails_at_construction() {
        let mut registry = FeatureRegistry::empty();
        registry.set(FeatureKind::Rms, Box::new(RmsExecutor));
        let err = FeatureDispatcher::new(registry).unwrap_err();
        assert!(err.to_string().contains("no executor"));
    }

    #[test]
    fn test_dispatch_rms() {
        let mut dispatcher = FeatureDispatcher::new(FeatureRegistry::with_defaults()).unwrap();
        let window = window_of(0.5, 512, 1);
        let value = dispatcher
            .dispatch(&window, &Feature::Rms(RmsOptions::default()))
            .unwrap();
        assert_eq!(value.as_scalar(), Some(0.5));
    }

    #[test]
    fn test_lufs_executor_accumulates_across_windows() {
        let mut dispatcher = FeatureDispatcher::new(FeatureRegistry::with_defaults()).unwrap();
        let feature = Feature::Lufs(LufsOptions::default());

        // 997 Hz tone fed window by window; integrated loudness converges
        // once enough 400 ms blocks have accumulated.
        let sr = 48000.0;
        let samples: Vec<f32> = (0..(sr as usize * 2))
            .map(|i| (2.0 * std::f64::consts::PI * 997.0 * i as f64 / sr).sin() as f32)
            .collect();

        let mut last = f64::NEG_INFINITY;
        for (index, chunk) in samples.chunks(4800).enumerate() {
            let window = AnalysisWindow {
                channels: vec![chunk.to_vec()],
                sample_rate: sr,
                start_sample: (index * 4800) as u64,
            };
            let value = dispatcher.dispatch(&window, &feature).unwrap();
            last = value.as_loudness().unwrap().integrated;
        }
        assert!((last - -3.01).abs() < 0.1, "integrated was {last}");
    }

    #[test]
    fn test_lufs_executor_resets_with_dispatcher() {
        let mut dispatcher = FeatureDispatcher::new(FeatureRegistry::with_defaults()).unwrap();
        let feature = Feature::Lufs(LufsOptions::default());
        let window = window_of(0.25, 48000, 1);

        dispatcher.dispatch(&window, &feature).unwrap();
        dispatcher.reset();
        let value = dispatcher.dispatch(&window, &feature).unwrap();
        // After reset the meter restarts; a single window of DC is killed
        // by the high-pass, so integrated stays at the silence sentinel
        // until real content accumulates again.
        let integrated = value.as_loudness().unwrap().integrated;
        assert!(integrated.is_infinite() || integrated < -20.0);
    }

    #[test]
    fn test_custom_executor_injection() {
        struct ConstantExecutor(f64);
        impl FeatureExecutor for ConstantExecutor {
            fn execute(
                &mut self,
                _window: &AnalysisWindow,
                _feature: &Feature,
            ) -> Result<FeatureValue> {
                Ok(FeatureValue::Scalar(self.0))
            }
        }

        let mut registry = FeatureRegistry::with_defaults();
        registry.set(FeatureKind::Peak, Box::new(ConstantExecutor(42.0)));
        let mut dispatcher = FeatureDispatcher::new(registry).unwrap();
        let value = dispatcher
            .dispatch(
                &window_of(0.0, 64, 1),
                &Feature::Peak(crate::features::PeakOptions::default()),
            )
            .unwrap();
        assert_eq!(value.as_scalar(), Some(42.0));
    }
}
