//! Turns a rolling second of multi-channel EEG into one number: the average
//! beta-band power across channels.

use crate::clock::{Clock, Seconds, SystemClock};
use crate::filter::{variance, BandpassFilter};
use crate::history::BoundedHistory;
use crate::signal_source::{Sample, SampleBlock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Tunables for [`BetaPowerExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Samples per second; also the ring buffer capacity.
    pub sampling_rate: usize,
    /// Pass band in Hz.
    pub band: (f64, f64),
    /// Butterworth order.
    pub filter_order: usize,
    /// Fewer buffered samples than this yields zero power.
    pub min_samples: usize,
    /// Entries kept in the power/timestamp histories.
    pub history_len: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 250,
            band: (13.0, 30.0),
            filter_order: 4,
            min_samples: 50,
            history_len: 1000,
        }
    }
}

/// Turns blocks of raw EEG into one beta-band power value per update.
///
/// Keeps the last second of samples per channel, band-passes them with a
/// zero-phase filter and averages the per-channel variance.
pub struct BetaPowerExtractor {
    config: ExtractorConfig,
    filter: Option<BandpassFilter>,
    buffer: BoundedHistory<Vec<Sample>>,
    beta_history: BoundedHistory<f64>,
    timestamps: BoundedHistory<Seconds>,
    clock: Box<dyn Clock>,
}

impl BetaPowerExtractor {
    /// An extractor on the system clock.
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// An extractor that timestamps its history with `clock`.
    pub fn with_clock(config: ExtractorConfig, clock: impl Clock + 'static) -> Self {
        let (low, high) = config.band;
        let filter =
            BandpassFilter::design(config.sampling_rate as f64, low, high, config.filter_order);
        if filter.is_none() {
            warn!(
                "Band {:.1}-{:.1} Hz is degenerate at {} Hz, beta power will read 0.",
                low, high, config.sampling_rate
            );
        }

        Self {
            filter,
            buffer: BoundedHistory::new(config.sampling_rate),
            beta_history: BoundedHistory::new(config.history_len),
            timestamps: BoundedHistory::new(config.history_len),
            clock: Box::new(clock),
            config,
        }
    }

    /// The settings this extractor was built with.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Appends every column of `block` to the ring buffer, oldest first.
    pub fn add_data(&mut self, block: Option<&SampleBlock>) {
        let Some(block) = block else {
            return;
        };
        for column in block.columns() {
            self.buffer.push(column);
        }
    }

    /// Number of timesteps currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Average across channels of the variance of the band-passed buffer.
    /// Returns 0.0 without touching the history when fewer than
    /// `min_samples` are buffered or the filter could not be designed.
    /// Channels whose filtering fails are left out of the average.
    pub fn get_beta_power(&mut self) -> f64 {
        let Some(filter) = &self.filter else {
            return 0.0;
        };
        if self.buffer.len() < self.config.min_samples {
            return 0.0;
        }

        let n_channels = self.buffer.iter().map(Vec::len).min().unwrap_or(0);
        let powers: Vec<f64> = (0..n_channels)
            .filter_map(|ch| {
                let series: Vec<f64> = self.buffer.iter().map(|col| col[ch]).collect();
                match filter.filtfilt(&series) {
                    Some(filtered) => Some(variance(&filtered)),
                    None => {
                        debug!("Skipping channel {} this round.", ch);
                        None
                    }
                }
            })
            .collect();

        let beta_power = if powers.is_empty() {
            0.0
        } else {
            powers.iter().sum::<f64>() / powers.len() as f64
        };

        self.beta_history.push(beta_power);
        self.timestamps.push(self.clock.now());
        beta_power
    }

    /// Past beta power values, oldest first.
    pub fn beta_history(&self) -> &BoundedHistory<f64> {
        &self.beta_history
    }

    /// When each entry of [`BetaPowerExtractor::beta_history`] was recorded.
    pub fn timestamps(&self) -> &BoundedHistory<Seconds> {
        &self.timestamps
    }

    /// Empties the sample buffer and both histories.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.beta_history.clear();
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::f64::consts::PI;

    fn sine_block(channels: usize, n: usize, freq: f64, amplitude: f64) -> SampleBlock {
        let row: Vec<f64> = (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / 250.0).sin())
            .collect();
        SampleBlock::from_channels(vec![row; channels])
    }

    fn extractor() -> (BetaPowerExtractor, ManualClock) {
        let clock = ManualClock::new(1000.0);
        (
            BetaPowerExtractor::with_clock(ExtractorConfig::default(), clock.clone()),
            clock,
        )
    }

    #[test]
    fn too_few_samples_reads_zero() {
        let (mut ex, _clock) = extractor();
        ex.add_data(Some(&sine_block(4, 49, 20.0, 10.0)));
        assert_eq!(ex.get_beta_power(), 0.0);
        assert!(ex.beta_history().is_empty());
        assert!(ex.timestamps().is_empty());
    }

    #[test]
    fn empty_or_absent_blocks_are_ignored() {
        let (mut ex, _clock) = extractor();
        ex.add_data(None);
        ex.add_data(Some(&SampleBlock::default()));
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn buffer_holds_one_second() {
        let (mut ex, _clock) = extractor();
        ex.add_data(Some(&sine_block(4, 600, 20.0, 1.0)));
        assert_eq!(ex.buffered(), 250);
    }

    #[test]
    fn beta_sine_reads_its_power() {
        let (mut ex, clock) = extractor();
        ex.add_data(Some(&sine_block(4, 250, 20.0, 10.0)));
        let power = ex.get_beta_power();
        assert!(power > 40.0 && power < 55.0, "power {}", power);
        assert_eq!(ex.beta_history().to_vec(), vec![power]);
        assert_eq!(ex.timestamps().to_vec(), vec![1000.0]);

        clock.advance(0.5);
        ex.get_beta_power();
        assert_eq!(ex.timestamps().to_vec(), vec![1000.0, 1000.5]);
    }

    #[test]
    fn alpha_sine_reads_little_power() {
        let (mut ex, _clock) = extractor();
        ex.add_data(Some(&sine_block(4, 250, 6.0, 10.0)));
        assert!(ex.get_beta_power() < 5.0);
    }

    #[test]
    fn degenerate_band_reads_zero() {
        let config = ExtractorConfig {
            band: (40.0, 20.0),
            ..ExtractorConfig::default()
        };
        let mut ex = BetaPowerExtractor::with_clock(config, ManualClock::new(0.0));
        ex.add_data(Some(&sine_block(4, 250, 20.0, 10.0)));
        assert_eq!(ex.get_beta_power(), 0.0);
        assert!(ex.beta_history().is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let config = ExtractorConfig {
            history_len: 3,
            ..ExtractorConfig::default()
        };
        let mut ex = BetaPowerExtractor::with_clock(config, ManualClock::new(0.0));
        ex.add_data(Some(&sine_block(1, 100, 20.0, 1.0)));
        for _ in 0..5 {
            ex.get_beta_power();
        }
        assert_eq!(ex.beta_history().len(), 3);
        assert_eq!(ex.timestamps().len(), 3);
    }

    #[test]
    fn reset_empties_everything() {
        let (mut ex, _clock) = extractor();
        ex.add_data(Some(&sine_block(2, 100, 20.0, 1.0)));
        ex.get_beta_power();
        ex.reset();
        assert_eq!(ex.buffered(), 0);
        assert!(ex.beta_history().is_empty());
        assert_eq!(ex.get_beta_power(), 0.0);
    }
}
