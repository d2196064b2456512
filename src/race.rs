//! The focus-driven car race.
//!
//! [`RaceStateMachine`] moves through `Menu -> Calibrating -> Racing ->
//! Finished` and back to `Menu`. Calls that make no sense in the current
//! state are ignored rather than reported, so a presentation loop can call
//! [`RaceStateMachine::update`] every frame without checking.

use crate::clock::{Clock, Seconds, SystemClock};

use log::info;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Distance to cover, in screen pixels.
pub const RACE_LENGTH: f64 = 1000.0;
/// Where the car stands before a race.
pub const CAR_START: (f64, f64) = (50.0, 300.0);
/// Top speed before the first race.
pub const INITIAL_MAX_SPEED: f64 = 8.0;
/// Top speed once a race is started.
pub const RACE_MAX_SPEED: f64 = 7.0;
/// Normalized focus needed for full movement.
pub const DEFAULT_FOCUS_THRESHOLD: f64 = 0.80;
/// Below this normalized focus the car only coasts.
pub const DEFAULT_MIN_FOCUS_TO_MOVE: f64 = 0.75;
/// Length of a calibration run.
pub const CALIBRATION_SECONDS: Seconds = 10.0;
/// Race loop ticks per second.
pub const RACE_UPDATE_HZ: f64 = 20.0;

/// Below this many calibration samples the fallback threshold is returned.
pub const MIN_CALIBRATION_SAMPLES: usize = 10;
/// Recommended threshold when calibration collected too little.
pub const FALLBACK_THRESHOLD: f64 = 30.0;
/// Lowest threshold calibration recommends.
pub const THRESHOLD_FLOOR: f64 = 20.0;
const THRESHOLD_MARGIN: f64 = 1.2;

const DECELERATION: f64 = 0.75;
const STOP_SPEED: f64 = 0.05;
const CRAWL_FRACTION: f64 = 0.15;
/// Speed is computed per frame at this rate and scaled by the real `dt`.
const BASE_FPS: f64 = 60.0;
const SCREEN_MARGIN: f64 = 50.0;

/// Where the race is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    /// Waiting for the player to start.
    Menu,
    /// Collecting beta power for a threshold recommendation.
    Calibrating,
    /// The car is moving.
    Racing,
    /// The car crossed the finish line.
    Finished,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Menu => "menu",
            Self::Calibrating => "calibrating",
            Self::Racing => "racing",
            Self::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// The player's car, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Car {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Pixels per frame at the base frame rate.
    pub speed: f64,
    /// Cap on `speed`.
    pub max_speed: f64,
}

impl Car {
    fn at_start(max_speed: f64) -> Self {
        Self {
            x: CAR_START.0,
            y: CAR_START.1,
            speed: 0.0,
            max_speed,
        }
    }
}

impl Default for Car {
    fn default() -> Self {
        Self::at_start(INITIAL_MAX_SPEED)
    }
}

/// Screen and difficulty settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Screen width in pixels.
    pub screen_width: f64,
    /// Screen height in pixels.
    pub screen_height: f64,
    /// Distance to the finish in pixels.
    pub race_length: f64,
    /// Top speed during a race.
    pub max_speed: f64,
    /// Normalized focus a player must hold for full movement.
    pub focus_threshold: f64,
    /// `None` derives it from the threshold on the next race start.
    pub min_focus_to_move: Option<f64>,
    /// Length of a calibration run.
    pub calibration_seconds: Seconds,
    /// Ticks per second of the race loop. Speed is scaled by the real `dt`,
    /// so this changes smoothness, not pace.
    pub update_hz: f64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            screen_width: 800.0,
            screen_height: 600.0,
            race_length: RACE_LENGTH,
            max_speed: RACE_MAX_SPEED,
            focus_threshold: DEFAULT_FOCUS_THRESHOLD,
            min_focus_to_move: Some(DEFAULT_MIN_FOCUS_TO_MOVE),
            calibration_seconds: CALIBRATION_SECONDS,
            update_hz: RACE_UPDATE_HZ,
        }
    }
}

impl RaceConfig {
    /// Time between race loop ticks; rates below 1 Hz are raised to 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_hz.max(1.0))
    }
}

/// A read-only snapshot for whoever draws the race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameData {
    /// Current lifecycle state.
    pub state: GameState,
    /// Car position, horizontal.
    pub car_x: f64,
    /// Car position, vertical.
    pub car_y: f64,
    /// Car speed.
    pub car_speed: f64,
    /// Last focus score fed to the race.
    pub current_focus: f64,
    /// Focus needed for full movement.
    pub focus_threshold: f64,
    /// Consecutive ticks at or above the threshold.
    pub focus_streak: u32,
    /// Longest streak this race.
    pub max_focus_streak: u32,
    /// Seconds since the race started.
    pub race_time: Seconds,
    /// Pixels covered so far.
    pub distance_traveled: f64,
    /// Pixels to cover.
    pub race_length: f64,
    /// Percent, capped at 100.
    pub progress: f64,
}

/// Recommended raw beta-power threshold from a calibration run: the median
/// with a 20% margin, never below [`THRESHOLD_FLOOR`], or
/// [`FALLBACK_THRESHOLD`] when too few samples were collected.
pub fn recommend_threshold(samples: &[f64]) -> f64 {
    if samples.len() < MIN_CALIBRATION_SAMPLES {
        return FALLBACK_THRESHOLD;
    }
    (median(samples) * THRESHOLD_MARGIN).max(THRESHOLD_FLOOR)
}

fn median(samples: &[f64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// The race game: menu, calibration, racing and finish.
///
/// All timing comes from the clock `C`, so tests drive it with a
/// [`ManualClock`](crate::clock::ManualClock).
pub struct RaceStateMachine<C: Clock = SystemClock> {
    config: RaceConfig,
    clock: C,

    state: GameState,
    car: Car,
    start_time: Option<Seconds>,
    finish_time: Option<Seconds>,
    race_time: Seconds,
    distance_traveled: f64,

    focus_threshold: f64,
    min_focus_to_move: Option<f64>,
    current_focus: f64,
    focus_streak: u32,
    max_focus_streak: u32,

    calibration_samples: Vec<f64>,
    calibration_start: Option<Seconds>,
}

impl RaceStateMachine<SystemClock> {
    /// A race on the system clock.
    pub fn new(config: RaceConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RaceStateMachine<C> {
    /// A race timed by `clock`.
    pub fn with_clock(config: RaceConfig, clock: C) -> Self {
        Self {
            focus_threshold: config.focus_threshold,
            min_focus_to_move: config.min_focus_to_move,
            config,
            clock,
            state: GameState::Menu,
            car: Car::default(),
            start_time: None,
            finish_time: None,
            race_time: 0.0,
            distance_traveled: 0.0,
            current_focus: 0.0,
            focus_streak: 0,
            max_focus_streak: 0,
            calibration_samples: Vec::new(),
            calibration_start: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GameState {
        self.state
    }

    /// The car.
    pub fn car(&self) -> &Car {
        &self.car
    }

    /// Normalized focus needed for full movement.
    pub fn focus_threshold(&self) -> f64 {
        self.focus_threshold
    }

    /// Sets the threshold, clamped to `[0, 1]`.
    pub fn set_focus_threshold(&mut self, threshold: f64) {
        self.focus_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Focus below which the car only coasts, if set.
    pub fn min_focus_to_move(&self) -> Option<f64> {
        self.min_focus_to_move
    }

    /// `None` makes the next [`RaceStateMachine::start_race`] derive it.
    pub fn set_min_focus_to_move(&mut self, min_focus: Option<f64>) {
        self.min_focus_to_move = min_focus.map(|m| m.clamp(0.0, 1.0));
    }

    /// Seconds since the race started, frozen at the finish.
    pub fn race_time(&self) -> Seconds {
        self.race_time
    }

    /// Race time at the finish line, if crossed.
    pub fn finish_time(&self) -> Option<Seconds> {
        self.finish_time
    }

    /// Longest focus streak of the current race.
    pub fn max_focus_streak(&self) -> u32 {
        self.max_focus_streak
    }

    /// Current focus streak.
    pub fn focus_streak(&self) -> u32 {
        self.focus_streak
    }

    /// Beta power collected during calibration.
    pub fn calibration_samples(&self) -> &[f64] {
        &self.calibration_samples
    }

    /// Enters `Calibrating` from any state with an empty sample list.
    pub fn start_calibration(&mut self) {
        self.state = GameState::Calibrating;
        self.calibration_samples.clear();
        self.calibration_start = Some(self.clock.now());
        info!("Calibrating for {:.0}s", self.config.calibration_seconds);
    }

    /// Ignored outside `Calibrating`.
    pub fn add_calibration_sample(&mut self, beta_power: f64) {
        if self.state == GameState::Calibrating {
            self.calibration_samples.push(beta_power);
        }
    }

    /// True once the calibration window has elapsed.
    pub fn is_calibration_complete(&self) -> bool {
        self.calibration_start
            .is_some_and(|start| self.clock.now() - start >= self.config.calibration_seconds)
    }

    /// Elapsed calibration time as a fraction of the window.
    pub fn calibration_progress(&self) -> f64 {
        match self.calibration_start {
            Some(start) if self.config.calibration_seconds > 0.0 => {
                ((self.clock.now() - start) / self.config.calibration_seconds).clamp(0.0, 1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    /// The threshold the calibration run recommends, in raw beta-power units.
    /// Leaves the state alone; the race threshold is normalized and set
    /// separately.
    pub fn finish_calibration(&self) -> f64 {
        let threshold = recommend_threshold(&self.calibration_samples);
        info!(
            "Calibration done: {} samples, recommended threshold {:.1}",
            self.calibration_samples.len(),
            threshold
        );
        threshold
    }

    /// Puts the car at the start and begins timing. Derives the minimum
    /// focus to move from the threshold when it is unset.
    pub fn start_race(&mut self) {
        let now = self.clock.now();
        self.state = GameState::Racing;
        self.start_time = Some(now);
        self.finish_time = None;
        self.race_time = 0.0;
        self.distance_traveled = 0.0;
        self.car = Car::at_start(self.config.max_speed);
        self.focus_streak = 0;
        self.max_focus_streak = 0;
        self.current_focus = 0.0;
        if self.min_focus_to_move.is_none() {
            self.min_focus_to_move = Some(DEFAULT_MIN_FOCUS_TO_MOVE.max(self.focus_threshold - 0.05));
        }
        info!("Race started, threshold {:.2}", self.focus_threshold);
    }

    /// Back to `Menu`. The car and the last result stay visible.
    pub fn reset_to_menu(&mut self) {
        self.state = GameState::Menu;
        self.calibration_start = None;
    }

    /// Records the latest focus score and keeps the streak counters.
    pub fn update_focus(&mut self, focus_score: f64) {
        self.current_focus = focus_score;
        if focus_score >= self.focus_threshold {
            self.focus_streak += 1;
            self.max_focus_streak = self.max_focus_streak.max(self.focus_streak);
        } else {
            self.focus_streak = 0;
        }
    }

    fn target_speed(&self, min_focus: f64) -> Option<f64> {
        let focus = self.current_focus;
        let threshold = self.focus_threshold;
        let max_speed = self.car.max_speed;

        if focus < min_focus {
            return None;
        }
        if focus >= threshold {
            let mut factor = if threshold < 1.0 {
                ((focus - threshold) / (1.0 - threshold)).powf(1.5)
            } else {
                1.0
            };
            factor = factor.clamp(0.0, 1.0);
            if focus < 0.85 {
                factor *= 0.2;
            } else if focus < 0.90 {
                factor *= 0.5;
            }
            Some(max_speed * factor)
        } else {
            let crawl = ((focus - min_focus) / (threshold - min_focus)).clamp(0.0, 1.0);
            Some(max_speed * CRAWL_FRACTION * crawl)
        }
    }

    /// Advances the car by `delta_time` seconds. Does nothing outside
    /// `Racing`.
    pub fn update(&mut self, delta_time: Seconds) {
        if self.state != GameState::Racing {
            return;
        }
        let now = self.clock.now();
        if let Some(start) = self.start_time {
            self.race_time = now - start;
        }

        let min_focus = self.min_focus_to_move.unwrap_or(DEFAULT_MIN_FOCUS_TO_MOVE);
        match self.target_speed(min_focus) {
            Some(speed) => self.car.speed = speed,
            None => {
                self.car.speed *= DECELERATION;
                if self.car.speed < STOP_SPEED {
                    self.car.speed = 0.0;
                }
            }
        }

        let step = self.car.speed * delta_time * BASE_FPS;
        self.car.x += step;
        self.distance_traveled += step;

        if self.distance_traveled >= self.config.race_length && self.finish_time.is_none() {
            self.finish_time = Some(now);
            self.state = GameState::Finished;
            if let Some(start) = self.start_time {
                self.race_time = now - start;
            }
            info!("Race finished in {:.2}s", self.race_time);
        }

        self.car.x = self
            .car
            .x
            .clamp(SCREEN_MARGIN, self.config.screen_width - SCREEN_MARGIN);
    }

    /// A snapshot for drawing.
    pub fn get_game_data(&self) -> GameData {
        GameData {
            state: self.state,
            car_x: self.car.x,
            car_y: self.car.y,
            car_speed: self.car.speed,
            current_focus: self.current_focus,
            focus_threshold: self.focus_threshold,
            focus_streak: self.focus_streak,
            max_focus_streak: self.max_focus_streak,
            race_time: self.race_time,
            distance_traveled: self.distance_traveled,
            race_length: self.config.race_length,
            progress: (self.distance_traveled / self.config.race_length * 100.0).min(100.0),
        }
    }
}
