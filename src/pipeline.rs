//! The producer's per-tick work, bundled into one explicit context.
//!
//! [`FocusPipeline`] owns the signal source, the scorer and the readiness
//! tracker. Each [`FocusPipeline::tick`] pulls a block, scores it and
//! updates the ready flag, strictly in that order. Nothing here is shared
//! between threads.

use crate::clock::Seconds;
use crate::component::Component;
use crate::config::FocusConfig;
use crate::focus_scorer::FocusScorer;
use crate::readiness::ReadinessTracker;
use crate::signal_source::{SampleBlock, SignalSource, SourceConfig, SourceError};

use log::{debug, info};
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

/// What one tick produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOutput {
    /// Beta power of the block.
    pub beta_power: f64,
    /// Smoothed focus score in `[0, 1]`.
    pub score: f64,
    /// The producer's ready flag after this tick.
    pub ready: bool,
}

/// Pulls up to `block_size` samples from the source.
pub struct Acquire<S> {
    source: S,
    block_size: usize,
}

impl<S: SignalSource> Component for Acquire<S> {
    type InData = ();
    type OutData = Option<SampleBlock>;

    fn convert(&mut self, _: ()) -> Option<SampleBlock> {
        self.source.get_block(self.block_size)
    }

    fn finalize(&mut self) {
        self.source.stop();
        self.source.disconnect();
    }
}

impl<S> fmt::Display for Acquire<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Acquire")
    }
}

/// Block in, `(beta_power, score)` out.
pub struct Score {
    scorer: FocusScorer,
    threshold: f64,
}

impl Component for Score {
    type InData = Option<SampleBlock>;
    type OutData = (f64, f64);

    fn convert(&mut self, block: Option<SampleBlock>) -> (f64, f64) {
        self.scorer.add_data(block.as_ref());
        let beta_power = self.scorer.get_beta_power();
        let score = self.scorer.score(Some(beta_power), Some(self.threshold));
        (beta_power, score)
    }

    fn finalize(&mut self) {
        let history = self.scorer.get_history();
        info!(
            "{}: {} scores recorded this session",
            self,
            history.focus_scores.len()
        );
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score")
    }
}

/// `(score, dt)` in, ready flag out.
pub struct Readiness {
    tracker: ReadinessTracker,
}

impl Component for Readiness {
    type InData = (f64, Seconds);
    type OutData = bool;

    fn convert(&mut self, (score, dt): (f64, Seconds)) -> bool {
        self.tracker.update(score, dt)
    }

    fn finalize(&mut self) {
        self.tracker.reset();
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Readiness")
    }
}

/// The producer pipeline: acquire a block, score it, track readiness.
pub struct FocusPipeline<S> {
    acquire: Acquire<S>,
    score: Score,
    readiness: Readiness,
    last: PipelineOutput,
    finalized: bool,
}

impl<S: SignalSource> FocusPipeline<S> {
    /// Wires `source` to a scorer and readiness tracker. The source is not
    /// touched until [`FocusPipeline::start`].
    pub fn new(source: S, scorer: FocusScorer, config: &FocusConfig) -> Self {
        Self {
            acquire: Acquire {
                source,
                block_size: config.block_size,
            },
            score: Score {
                scorer,
                threshold: config.threshold,
            },
            readiness: Readiness {
                tracker: ReadinessTracker::new(
                    config.readiness.threshold,
                    config.readiness.duration,
                ),
            },
            last: PipelineOutput::default(),
            finalized: false,
        }
    }

    /// Connects and starts the source. Failure here is fatal to the caller.
    pub fn start(&mut self, source_config: &SourceConfig) -> Result<(), SourceError> {
        let source = &mut self.acquire.source;
        source.connect(source_config)?;
        source.start()?;
        info!(
            "Streaming {} channels at {} Hz",
            source.channel_count(),
            source.sampling_rate()
        );
        Ok(())
    }

    /// One block through every stage.
    pub fn tick(&mut self, dt: Seconds) -> PipelineOutput {
        let block = self.acquire.convert(());
        let (beta_power, score) = self.score.convert(block);
        let ready = self.readiness.convert((score, dt));
        self.last = PipelineOutput {
            beta_power,
            score,
            ready,
        };
        self.last
    }

    /// What the last [`FocusPipeline::tick`] produced.
    pub fn last_output(&self) -> PipelineOutput {
        self.last
    }

    /// Raw beta-power threshold used by the scorer.
    pub fn threshold(&self) -> f64 {
        self.score.threshold
    }

    /// Replaces the scorer threshold, e.g. after calibration.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.score.threshold = threshold;
    }

    /// The scorer, for its histories.
    pub fn scorer(&self) -> &FocusScorer {
        &self.score.scorer
    }

    /// The signal source.
    pub fn source(&self) -> &S {
        &self.acquire.source
    }

    /// Starts scoring over: scorer per its reset policy, plus the ready
    /// timer.
    pub fn reset(&mut self) {
        self.score.scorer.reset();
        self.readiness.tracker.reset();
        self.last = PipelineOutput::default();
    }

    /// Finalizes every stage, releasing the source. Safe to call twice.
    pub fn shutdown(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.acquire.finalize();
        self.score.finalize();
        self.readiness.finalize();
        debug!("Pipeline finalized");
    }
}

/// Ticks `pipeline` every `interval` until `running` is cleared or
/// `on_tick` returns `false`. Each tick's `dt` is measured, not assumed.
pub fn run_server_loop<S, F>(
    pipeline: &mut FocusPipeline<S>,
    interval: Duration,
    running: &AtomicBool,
    mut on_tick: F,
) where
    S: SignalSource,
    F: FnMut(&PipelineOutput) -> bool,
{
    let mut last = Instant::now();
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        let output = pipeline.tick(dt);
        if !on_tick(&output) {
            break;
        }

        let spent = now.elapsed();
        if spent < interval {
            spin_sleep::sleep(interval - spent);
        }
    }
    pipeline.shutdown();
}
