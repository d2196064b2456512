//! `FocusScorer`
//!
//! Maps beta power onto a bounded, de-spiked, smoothed focus score in
//! `[0, 1]`. The scorer owns the [`BetaPowerExtractor`] that feeds it so that
//! one object holds the whole per-session signal state and one
//! [`FocusScorer::reset`] clears it.
//!
//! Each call to [`FocusScorer::score`] runs, in order:
//!
//! 1. normalization against `threshold * 10`,
//! 2. a response curve that is steep near 1.0,
//! 3. a clamp on jumps above the mean of the last ten scores,
//! 4. an exponential moving average.

use crate::beta_power::{BetaPowerExtractor, ExtractorConfig};
use crate::clock::{Clock, Seconds, SystemClock};
use crate::history::BoundedHistory;
use crate::signal_source::SampleBlock;

use log::debug;
use serde::{Deserialize, Serialize};

/// Beta power at `threshold * MAX_POWER_FACTOR` scores a raw 1.0.
pub const MAX_POWER_FACTOR: f64 = 10.0;
/// Raw values at or below the knee follow `raw^CURVE_EXPONENT`.
pub const CURVE_KNEE: f64 = 0.7;
/// Shape of the curve below the knee; under 1 lifts low values.
pub const CURVE_EXPONENT: f64 = 0.4;
/// Shape of the curve above the knee.
pub const EXCESS_EXPONENT: f64 = 1.5;
/// Scores remembered for spike detection.
pub const SPIKE_WINDOW: usize = 10;
/// A jump this far above the recent mean is a spike.
pub const SPIKE_JUMP: f64 = 0.4;
/// Spikes are cut back to this far above the recent mean.
pub const SPIKE_STEP: f64 = 0.2;
/// Weight of the newest score in the exponential smoothing.
pub const SMOOTHING_ALPHA: f64 = 0.25;

const DEBUG_INTERVAL: Seconds = 5.0;

/// What [`FocusScorer::reset`] does with the smoothing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// Forget the smoothing accumulator and the spike window too.
    #[default]
    ClearAll,
    /// Keep them, so the first scores after a reset lean on the old session.
    KeepSmoothing,
}

/// The pure part of scoring: normalization plus response curve.
///
/// Monotone non-decreasing in `beta_power`, always in `[0, 1]`. Negative
/// power reads as zero.
pub fn curve(beta_power: f64, threshold: f64) -> f64 {
    let max_power = threshold * MAX_POWER_FACTOR;
    let raw = (beta_power / max_power).clamp(0.0, 1.0);
    let curved = if raw > CURVE_KNEE {
        let excess = (raw - CURVE_KNEE) / (1.0 - CURVE_KNEE);
        let knee = CURVE_KNEE.powf(CURVE_EXPONENT);
        knee + excess.powf(EXCESS_EXPONENT) * (1.0 - knee)
    } else {
        raw.powf(CURVE_EXPONENT)
    };
    curved.clamp(0.0, 1.0)
}

/// Ordered copies of the three histories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreHistory {
    /// When each score was produced.
    pub timestamps: Vec<Seconds>,
    /// Beta power behind each score.
    pub beta_powers: Vec<f64>,
    /// Smoothed focus scores in `[0, 1]`.
    pub focus_scores: Vec<f64>,
}

/// Turns beta power into a smoothed focus score in `[0, 1]`.
pub struct FocusScorer {
    extractor: BetaPowerExtractor,
    policy: ResetPolicy,
    smoothed_focus: Option<f64>,
    recent_scores: BoundedHistory<f64>,
    focus_scores: BoundedHistory<f64>,
    clock: Box<dyn Clock>,
    last_debug: Option<Seconds>,
}

impl FocusScorer {
    /// A scorer on the system clock.
    pub fn new(config: ExtractorConfig, policy: ResetPolicy) -> Self {
        Self::with_clock(config, policy, SystemClock)
    }

    /// A scorer whose extractor and debug output use `clock`.
    pub fn with_clock(
        config: ExtractorConfig,
        policy: ResetPolicy,
        clock: impl Clock + Clone + 'static,
    ) -> Self {
        let history_len = config.history_len;
        Self {
            extractor: BetaPowerExtractor::with_clock(config, clock.clone()),
            policy,
            smoothed_focus: None,
            recent_scores: BoundedHistory::new(SPIKE_WINDOW),
            focus_scores: BoundedHistory::new(history_len),
            clock: Box::new(clock),
            last_debug: None,
        }
    }

    /// What [`FocusScorer::reset`] keeps.
    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// The extractor feeding this scorer.
    pub fn extractor(&self) -> &BetaPowerExtractor {
        &self.extractor
    }

    /// See [`BetaPowerExtractor::add_data`].
    pub fn add_data(&mut self, block: Option<&SampleBlock>) {
        self.extractor.add_data(block);
    }

    /// See [`BetaPowerExtractor::get_beta_power`].
    pub fn get_beta_power(&mut self) -> f64 {
        self.extractor.get_beta_power()
    }

    /// Last emitted score, if any.
    pub fn smoothed_focus(&self) -> Option<f64> {
        self.smoothed_focus
    }

    /// Turns `beta_power` into a focus score. Returns 0.0 without touching
    /// any state when either input is missing or not finite, or when
    /// `threshold <= 0`.
    pub fn score(&mut self, beta_power: Option<f64>, threshold: Option<f64>) -> f64 {
        let (Some(beta_power), Some(threshold)) = (beta_power, threshold) else {
            return 0.0;
        };
        if !beta_power.is_finite() || !threshold.is_finite() || threshold <= 0.0 {
            return 0.0;
        }

        let curved = curve(beta_power, threshold);
        let despiked = self.despike(curved);

        let smoothed = match self.smoothed_focus {
            Some(prev) => SMOOTHING_ALPHA * despiked + (1.0 - SMOOTHING_ALPHA) * prev,
            None => despiked,
        };
        self.smoothed_focus = Some(smoothed);

        self.trace(beta_power, threshold, curved, despiked, smoothed);
        self.focus_scores.push(smoothed);
        smoothed
    }

    // Jumps more than SPIKE_JUMP above the recent mean are cut back to
    // SPIKE_STEP above it.
    fn despike(&mut self, curved: f64) -> f64 {
        let value = match self.recent_scores.mean() {
            Some(mean) if curved > mean + SPIKE_JUMP => (mean + SPIKE_STEP).min(1.0),
            _ => curved,
        };
        self.recent_scores.push(value);
        value
    }

    fn trace(&mut self, beta_power: f64, threshold: f64, curved: f64, despiked: f64, emitted: f64) {
        let now = self.clock.now();
        let last = *self.last_debug.get_or_insert(now);
        if now - last > DEBUG_INTERVAL {
            let max_power = threshold * MAX_POWER_FACTOR;
            debug!(
                "Beta power: {:.2}, threshold: {:.2}, max power: {:.2}, raw: {:.3}, curved: {:.3}, before smoothing: {:.3}, final: {:.3}",
                beta_power,
                threshold,
                max_power,
                (beta_power / max_power).min(1.0),
                curved,
                despiked,
                emitted
            );
            self.last_debug = Some(now);
        }
    }

    /// Timestamps, beta powers and focus scores in the order they were
    /// recorded. All three are empty until a beta power has been recorded.
    pub fn get_history(&self) -> ScoreHistory {
        if self.extractor.timestamps().is_empty() {
            return ScoreHistory::default();
        }
        ScoreHistory {
            timestamps: self.extractor.timestamps().to_vec(),
            beta_powers: self.extractor.beta_history().to_vec(),
            focus_scores: self.focus_scores.to_vec(),
        }
    }

    /// Clears the sample buffer and the three histories, plus the smoothing
    /// state under [`ResetPolicy::ClearAll`].
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.focus_scores.clear();
        if self.policy == ResetPolicy::ClearAll {
            self.smoothed_focus = None;
            self.recent_scores.clear();
        }
    }
}
