//! A [`SignalSource`] that needs no hardware. It produces EEG-looking blocks
//! whose beta content rises and falls on a slow cycle, so the whole game can be
//! played (and tested) without a headset.

use crate::clock::{Clock, Seconds, SystemClock};
use crate::signal_source::*;
use log::info;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

const BETA_FREQ: f64 = 20.0;
const ALPHA_FREQ: f64 = 10.0;
const BETA_GAIN: f64 = 15.0;
const ALPHA_GAIN: f64 = 10.0;

/// Fake EEG: a focus-modulated beta tone, an inverse alpha tone and white
/// noise on every channel.
pub struct SyntheticSource {
    channels: usize,
    sampling_rate: usize,
    noise: f64,
    rng: StdRng,
    clock: Box<dyn Clock>,
    phase: f64,
    started_at: Option<Seconds>,
    connected: bool,
    streaming: bool,
}

/// Builds a [`SyntheticSource`]; every setting has a sensible default.
pub struct SyntheticSourceBuilder {
    channels: usize,
    sampling_rate: usize,
    noise: f64,
    seed: Option<u64>,
    clock: Box<dyn Clock>,
}

impl SyntheticSourceBuilder {
    /// Number of identical-looking channels to generate.
    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Samples per second per channel.
    pub fn sampling_rate(mut self, sampling_rate: usize) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    /// Standard deviation of the additive gaussian noise.
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Makes the noise reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Where the generator reads "now" from.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Finishes the source. It still has to be connected and started.
    pub fn build(self) -> SyntheticSource {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SyntheticSource {
            channels: self.channels,
            sampling_rate: self.sampling_rate.max(1),
            noise: self.noise,
            rng,
            clock: self.clock,
            phase: 0.0,
            started_at: None,
            connected: false,
            streaming: false,
        }
    }
}

impl SyntheticSource {
    /// Starts from the [`BoardProfile::Synthetic`] defaults with 2.0 noise.
    pub fn builder() -> SyntheticSourceBuilder {
        let profile = BoardProfile::Synthetic;
        SyntheticSourceBuilder {
            channels: profile.channel_count(),
            sampling_rate: profile.sampling_rate(),
            noise: 2.0,
            seed: None,
            clock: Box::new(SystemClock),
        }
    }

    /// Instantiates a generator with the default synthetic profile.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// How "focused" the fake player is `elapsed` seconds into the stream.
    pub fn focus_level(elapsed: Seconds) -> f64 {
        let level = 0.5 + 0.3 * (elapsed / 5.0).sin() + 0.2 * (elapsed / 1.0).sin();
        level.clamp(0.2, 1.0)
    }

    fn generate(&mut self, n_samples: usize, elapsed: Seconds) -> SampleBlock {
        let focus = Self::focus_level(elapsed);
        let beta_amplitude = focus * BETA_GAIN;
        let alpha_amplitude = (1.0 - focus) * ALPHA_GAIN;
        let rate = self.sampling_rate as f64;

        let channels = (0..self.channels)
            .map(|_| {
                (0..n_samples)
                    .map(|i| {
                        let t = i as f64 / rate + elapsed;
                        let beta = beta_amplitude * (2.0 * PI * BETA_FREQ * t + self.phase).sin();
                        let alpha = alpha_amplitude * (2.0 * PI * ALPHA_FREQ * t).sin();
                        beta + alpha + self.gaussian() * self.noise
                    })
                    .collect()
            })
            .collect();

        self.phase += 2.0 * PI * BETA_FREQ * n_samples as f64 / rate;
        SampleBlock::from_channels(channels)
    }

    /// Whether `start` has been called and `stop` has not.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for SyntheticSource {
    fn connect(&mut self, config: &SourceConfig) -> Result<(), SourceError> {
        if config.profile != BoardProfile::Synthetic {
            return Err(SourceError::WrongProfile {
                expected: "Synthetic",
                got: config.profile,
            });
        }
        config.validate()?;
        info!(
            "Synthetic source ready: {} channels at {} Hz",
            self.channels, self.sampling_rate
        );
        self.connected = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if !self.connected {
            return Err(SourceError::NotConnected);
        }
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
        self.streaming = true;
        Ok(())
    }

    fn get_block(&mut self, max_samples: usize) -> Option<SampleBlock> {
        if !self.streaming {
            return None;
        }
        let now = self.clock.now();
        let elapsed = now - *self.started_at.get_or_insert(now);
        Some(self.generate(max_samples, elapsed))
    }

    fn stop(&mut self) {
        self.streaming = false;
    }

    fn disconnect(&mut self) {
        self.stop();
        self.connected = false;
    }

    fn sampling_rate(&self) -> usize {
        self.sampling_rate
    }

    fn channel_count(&self) -> usize {
        self.channels
    }
}
