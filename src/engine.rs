//! The assembled metering pipeline.
//!
//! Two cooperating halves joined by lock-free plumbing:
//!
//! - [`Analyzer`] lives with the real-time audio callback. `append` writes
//!   the ring buffer, runs the hop check, and hands window snapshots to the
//!   worker with `try_send`. It never blocks and never locks.
//! - A worker thread owns the [`FeatureDispatcher`] and all stateful
//!   executors. It publishes results over a bounded message channel, the
//!   lock-free loudness levels, and an `ArcSwap`ped latest-result slot.
//!
//! [`AnalyzerHandle`] is the host's cloneable view: control commands,
//! message receiver, counters, level peeking.

use std::sync::Arc;
use std::thread::JoinHandle;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::buffer::{AnalysisWindow, SlidingWindowBuffer};
use crate::config::{AnalyzerConfig, ConfigUpdate};
use crate::dispatch::{FeatureDispatcher, FeatureRegistry};
use crate::error::{Error, Result};
use crate::features::{Feature, FeatureValue};
use crate::lockfree::{AtomicFlag, AtomicLoudness, LoudnessLevels};
use crate::message::{AnalysisError, AnalysisResult, OutboundMessage, OverflowDetails};
use crate::scheduler::{HopDecision, HopScheduler};
use crate::stats::{PipelineStats, StatsSnapshot};

/// Work queue depth. Exclusivity is enforced by the in-flight flag, not the
/// queue; headroom only exists so reset markers never collide with a
/// just-dispatched analysis.
const WORK_QUEUE_CAPACITY: usize = 8;

/// Default bound on the host-facing message channel.
const DEFAULT_MESSAGE_CAPACITY: usize = 256;

enum Command {
    Update(ConfigUpdate),
    Reset,
}

enum WorkItem {
    Analyze(AnalysisRequest),
    Reset,
}

struct AnalysisRequest {
    window: AnalysisWindow,
    feature: Feature,
    timestamp: f64,
}

/// Clears the in-flight flag when the worker finishes a request, success or
/// failure alike.
struct FlightGuard<'a>(&'a AtomicFlag);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Real-time half of the pipeline. Owned by the audio callback.
pub struct Analyzer {
    config: AnalyzerConfig,
    buffer: SlidingWindowBuffer,
    scheduler: HopScheduler,
    in_flight: Arc<AtomicFlag>,
    stats: Arc<PipelineStats>,
    work_tx: Option<Sender<WorkItem>>,
    msg_tx: Sender<OutboundMessage>,
    cmd_rx: Receiver<Command>,
    worker: Option<JoinHandle<()>>,
}

/// Host-side view of a running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct AnalyzerHandle {
    cmd_tx: Sender<Command>,
    msg_rx: Receiver<OutboundMessage>,
    stats: Arc<PipelineStats>,
    levels: Arc<AtomicLoudness>,
    latest: Arc<ArcSwapOption<AnalysisResult>>,
}

/// Builder for [`Analyzer`] / [`AnalyzerHandle`] pairs.
pub struct AnalyzerBuilder {
    config: AnalyzerConfig,
    registry: Option<FeatureRegistry>,
    message_capacity: usize,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            registry: None,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
        }
    }
}

impl AnalyzerBuilder {
    pub fn window_size(mut self, window_size: usize) -> Self {
        self.config.window_size = window_size;
        self
    }

    pub fn hop_size(mut self, hop_size: usize) -> Self {
        self.config.hop_size = hop_size;
        self
    }

    pub fn channel_count(mut self, channel_count: usize) -> Self {
        self.config.channel_count = channel_count;
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.config.feature = feature;
        self
    }

    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default feature registry (test injection, custom
    /// executors). Validated during `build`.
    pub fn registry(mut self, registry: FeatureRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<(Analyzer, AnalyzerHandle)> {
        self.config.validate()?;

        let registry = self.registry.unwrap_or_default();
        let mut dispatcher = FeatureDispatcher::new(registry)?;

        let buffer = SlidingWindowBuffer::new(
            self.config.window_size,
            self.config.hop_size,
            self.config.channel_count,
        )?;
        let scheduler = HopScheduler::new(self.config.window_size, self.config.hop_size)?;

        let (work_tx, work_rx) = bounded::<WorkItem>(WORK_QUEUE_CAPACITY);
        let (msg_tx, msg_rx) = bounded::<OutboundMessage>(self.message_capacity);
        let (cmd_tx, cmd_rx) = unbounded::<Command>();

        let in_flight = Arc::new(AtomicFlag::new(false));
        let stats = Arc::new(PipelineStats::new());
        let levels = Arc::new(AtomicLoudness::new());
        let latest: Arc<ArcSwapOption<AnalysisResult>> = Arc::new(ArcSwapOption::const_empty());

        let worker = {
            let msg_tx = msg_tx.clone();
            let stats = Arc::clone(&stats);
            let in_flight = Arc::clone(&in_flight);
            let levels = Arc::clone(&levels);
            let latest = Arc::clone(&latest);
            std::thread::Builder::new()
                .name("meterbridge-analysis".into())
                .spawn(move || {
                    for item in work_rx.iter() {
                        match item {
                            WorkItem::Reset => {
                                dispatcher.reset();
                                levels.reset();
                                latest.store(None);
                            }
                            WorkItem::Analyze(request) => {
                                // Guard drops before counters move or the
                                // message is sent, so an observer seeing
                                // either knows the pipeline is ready for the
                                // next hop.
                                let message = {
                                    let _guard = FlightGuard(&in_flight);
                                    run_analysis(&mut dispatcher, request, &levels, &latest)
                                };
                                match &message {
                                    OutboundMessage::Result(_) => stats.record_completed(),
                                    OutboundMessage::Error(_) => stats.record_failed(),
                                    OutboundMessage::BufferOverflow(_) => {}
                                }
                                if msg_tx.try_send(message).is_err() {
                                    stats.record_dropped_message();
                                }
                            }
                        }
                    }
                    tracing::debug!("analysis worker stopped");
                })
                .expect("failed to spawn analysis worker")
        };

        tracing::debug!(
            window_size = self.config.window_size,
            hop_size = self.config.hop_size,
            channel_count = self.config.channel_count,
            "analyzer started"
        );

        let analyzer = Analyzer {
            config: self.config,
            buffer,
            scheduler,
            in_flight,
            stats: Arc::clone(&stats),
            work_tx: Some(work_tx),
            msg_tx,
            cmd_rx,
            worker: Some(worker),
        };
        let handle = AnalyzerHandle {
            cmd_tx,
            msg_rx,
            stats,
            levels,
            latest,
        };

        Ok((analyzer, handle))
    }
}

/// Dispatch one request and build the outcome message.
fn run_analysis(
    dispatcher: &mut FeatureDispatcher,
    request: AnalysisRequest,
    levels: &AtomicLoudness,
    latest: &ArcSwapOption<AnalysisResult>,
) -> OutboundMessage {
    let window_start = request.window.start_sample;
    match dispatcher.dispatch(&request.window, &request.feature) {
        Ok(value) => {
            if let FeatureValue::Loudness(lufs) = &value {
                let last = |series: &Option<Vec<f64>>| {
                    series
                        .as_ref()
                        .and_then(|values| values.last().copied())
                        .unwrap_or(f64::NEG_INFINITY)
                };
                levels.set(last(&lufs.momentary), last(&lufs.short_term), lufs.integrated);
            }

            let result = AnalysisResult {
                kind: request.feature.kind(),
                value,
                window_start,
                timestamp: request.timestamp,
            };
            latest.store(Some(Arc::new(result.clone())));
            OutboundMessage::Result(result)
        }
        Err(err) => {
            tracing::debug!(error = %err, "analysis failed");
            OutboundMessage::Error(AnalysisError {
                message: err.to_string(),
                timestamp: request.timestamp,
            })
        }
    }
}

impl Analyzer {
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::default()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Deliver one frame of per-channel samples from the audio callback.
    ///
    /// Applies pending control commands, writes the ring buffer, and
    /// dispatches an analysis when a hop is due. Never blocks.
    pub fn append(&mut self, frame: &[&[f32]]) -> Result<()> {
        self.drain_commands();

        let shift = self.buffer.append(frame)?;
        self.stats.record_frame(frame[0].len());

        if let Some(report) = shift {
            self.stats.record_overflow();
            self.try_publish(OutboundMessage::BufferOverflow(OverflowDetails {
                write_position: report.write_position as u64,
                window_size: self.config.window_size,
                timestamp: self.sample_clock(),
            }));
        }

        match self
            .scheduler
            .on_frame_appended(&mut self.buffer, self.in_flight.get())
        {
            HopDecision::Idle | HopDecision::Busy => {}
            HopDecision::Trigger { dropped_hops } => {
                self.stats.record_trigger();
                if dropped_hops > 0 {
                    self.stats.record_dropped_hops(dropped_hops);
                }
                self.dispatch_window()?;
            }
        }

        Ok(())
    }

    /// Sample-clock time of the newest appended sample, in seconds.
    fn sample_clock(&self) -> f64 {
        self.buffer.total_appended() as f64 / self.config.sample_rate
    }

    fn dispatch_window(&mut self) -> Result<()> {
        let channels = self.buffer.extract_window()?;
        let window = AnalysisWindow {
            channels,
            sample_rate: self.config.sample_rate,
            start_sample: self.buffer.total_appended() - self.config.window_size as u64,
        };
        let request = AnalysisRequest {
            window,
            feature: self.config.feature.clone(),
            timestamp: self.sample_clock(),
        };

        self.in_flight.set(true);
        if let Some(work_tx) = &self.work_tx {
            if work_tx.try_send(WorkItem::Analyze(request)).is_err() {
                // Queue full or worker gone: shed this hop instead of
                // blocking the audio thread.
                self.in_flight.set(false);
                self.stats.record_dropped_hops(1);
            }
        }
        Ok(())
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.cmd_rx.try_recv() {
            match command {
                Command::Reset => self.apply_reset(),
                Command::Update(update) => self.apply_update(update),
            }
        }
    }

    fn apply_reset(&mut self) {
        self.buffer.reset();
        self.in_flight.set(false);
        self.stats.reset();
        if let Some(work_tx) = &self.work_tx {
            let _ = work_tx.try_send(WorkItem::Reset);
        }
    }

    fn apply_update(&mut self, update: ConfigUpdate) {
        let previous = self.config.clone();
        let reinit = update.apply(&mut self.config);

        if let Err(err) = self.config.validate() {
            self.config = previous;
            self.try_publish(OutboundMessage::Error(AnalysisError {
                message: err.to_string(),
                timestamp: self.sample_clock(),
            }));
            return;
        }

        if reinit {
            // Window or channel layout changed: buffered audio is discarded
            // by design, no migration of in-flight state.
            self.buffer = SlidingWindowBuffer::new(
                self.config.window_size,
                self.config.hop_size,
                self.config.channel_count,
            )
            .expect("validated config");
            self.scheduler = HopScheduler::new(self.config.window_size, self.config.hop_size)
                .expect("validated config");
        } else if self.config.hop_size != previous.hop_size {
            self.scheduler = HopScheduler::new(self.config.window_size, self.config.hop_size)
                .expect("validated config");
        }
    }

    fn try_publish(&self, message: OutboundMessage) {
        if self.msg_tx.try_send(message).is_err() {
            self.stats.record_dropped_message();
        }
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        // Disconnect the work channel; the worker drains and exits.
        self.work_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl AnalyzerHandle {
    /// Apply a partial configuration update at the next frame boundary.
    pub fn update(&self, update: ConfigUpdate) -> Result<()> {
        self.cmd_tx
            .send(Command::Update(update))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Zero buffers and counters, clear the in-flight guard, and reset
    /// stateful executors, at the next frame boundary.
    pub fn reset(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Reset)
            .map_err(|_| Error::ChannelClosed)
    }

    /// The outbound message stream.
    pub fn messages(&self) -> &Receiver<OutboundMessage> {
        &self.msg_rx
    }

    /// Non-blocking poll for the next message.
    pub fn poll(&self) -> Option<OutboundMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Pipeline counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Latest loudness levels published by the LUFS executor. Measures not
    /// enabled in the feature options read `-inf`.
    pub fn loudness(&self) -> LoudnessLevels {
        self.levels.get()
    }

    /// Most recent analysis result, without consuming the message stream.
    pub fn latest_result(&self) -> Option<Arc<AnalysisResult>> {
        self.latest.load_full()
    }
}
