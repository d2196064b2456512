//! The "ready" flag: sustained focus above a threshold for long enough.
//!
//! The producer runs a [`ReadinessTracker`] next to the scorer and ships the
//! flag alongside every dashboard message. The dashboard runs a
//! [`ReadyWindow`], which is slower to fill, forgiving on short lapses, and
//! holds READY for a fixed time before starting over.

use crate::clock::Seconds;
use crate::history::BoundedHistory;

/// Score at or above which the producer counts the player as focused.
pub const READY_THRESHOLD: f64 = 0.7;
/// Seconds of uninterrupted focus before the flag goes up.
pub const READY_DURATION: Seconds = 3.0;

/// One step of the producer's ready rule. Returns the flag and the new timer.
///
/// The timer grows by `dt` while `score >= threshold` and drops to zero the
/// moment it does not.
pub fn ready_step(
    score: f64,
    timer: Seconds,
    dt: Seconds,
    threshold: f64,
    duration: Seconds,
) -> (bool, Seconds) {
    if score >= threshold {
        let timer = timer + dt;
        (timer >= duration, timer)
    } else {
        (false, 0.0)
    }
}

/// Stateful wrapper around [`ready_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessTracker {
    threshold: f64,
    duration: Seconds,
    timer: Seconds,
    ready: bool,
}

impl ReadinessTracker {
    /// A tracker needing `duration` seconds at or above `threshold`.
    pub fn new(threshold: f64, duration: Seconds) -> Self {
        Self {
            threshold,
            duration,
            timer: 0.0,
            ready: false,
        }
    }

    /// Advances by `dt` with the latest score and returns the ready flag.
    pub fn update(&mut self, score: f64, dt: Seconds) -> bool {
        let (ready, timer) = ready_step(score, self.timer, dt, self.threshold, self.duration);
        self.ready = ready;
        self.timer = timer;
        ready
    }

    /// The flag from the last update.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Seconds of unbroken focus so far.
    pub fn timer(&self) -> Seconds {
        self.timer
    }

    /// Clears the timer and the flag.
    pub fn reset(&mut self) {
        self.timer = 0.0;
        self.ready = false;
    }
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new(READY_THRESHOLD, READY_DURATION)
    }
}

/// A completed READY window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyLogEntry {
    /// When READY began.
    pub started_at: Seconds,
    /// How long READY was held.
    pub held: Seconds,
}

/// What the dashboard should show after a [`ReadyWindow::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadyStatus {
    /// Still filling up.
    Charging {
        /// Fraction of the required time accumulated, in `[0, 1]`.
        progress: f64,
        /// Focused seconds still needed.
        seconds_left: Seconds,
    },
    /// Within the hold period.
    Ready,
}

const LOG_LEN: usize = 50;

/// The dashboard's ready rule.
///
/// Focused time accumulates; unfocused time drains the timer at half speed.
/// Once the timer reaches `required` seconds the window is READY for `hold`
/// seconds, then it is logged and everything starts from zero.
#[derive(Debug, Clone)]
pub struct ReadyWindow {
    required: Seconds,
    hold: Seconds,
    timer: Seconds,
    window_start: Option<Seconds>,
    log: BoundedHistory<ReadyLogEntry>,
}

impl ReadyWindow {
    /// A window needing `required` seconds of focus, held for `hold`.
    pub fn new(required: Seconds, hold: Seconds) -> Self {
        Self {
            required,
            hold,
            timer: 0.0,
            window_start: None,
            log: BoundedHistory::new(LOG_LEN),
        }
    }

    /// Advances the window by `dt` ending at `now`.
    pub fn update(&mut self, focused: bool, dt: Seconds, now: Seconds) -> ReadyStatus {
        match self.window_start {
            None => {
                if focused {
                    self.timer += dt;
                } else {
                    self.timer = (self.timer - dt * 0.5).max(0.0);
                }
                if self.timer >= self.required {
                    self.window_start = Some(now);
                }
            }
            Some(start) => {
                if now - start >= self.hold {
                    self.log.push(ReadyLogEntry {
                        started_at: start,
                        held: now - start,
                    });
                    self.timer = 0.0;
                    self.window_start = None;
                }
            }
        }
        self.status()
    }

    /// The status as of the last update.
    pub fn status(&self) -> ReadyStatus {
        if self.window_start.is_some() {
            return ReadyStatus::Ready;
        }
        let progress = if self.required > 0.0 {
            (self.timer / self.required).min(1.0)
        } else {
            1.0
        };
        ReadyStatus::Charging {
            progress,
            seconds_left: (self.required - self.timer).max(0.0),
        }
    }

    /// True while the window is held.
    pub fn is_ready(&self) -> bool {
        self.window_start.is_some()
    }

    /// Most recent windows last.
    pub fn log(&self) -> &BoundedHistory<ReadyLogEntry> {
        &self.log
    }
}

/// Whether the dashboard counts this tick as focused: the producer's flag
/// when it sent one, else `attention >= focus_threshold` (both on 0..100).
pub fn is_focused(ready_flag: Option<bool>, attention: f64, focus_threshold: f64) -> bool {
    ready_flag.unwrap_or(attention >= focus_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_step_needs_uninterrupted_focus() {
        let (ready, timer) = ready_step(0.8, 0.0, 1.0, 0.7, 3.0);
        assert!(!ready);
        assert_eq!(timer, 1.0);
        let (ready, timer) = ready_step(0.7, 2.0, 1.0, 0.7, 3.0);
        assert!(ready);
        assert_eq!(timer, 3.0);
        let (ready, timer) = ready_step(0.69, 10.0, 1.0, 0.7, 3.0);
        assert!(!ready);
        assert_eq!(timer, 0.0);
    }

    #[test]
    fn tracker_follows_ready_step() {
        let mut tracker = ReadinessTracker::default();
        for _ in 0..5 {
            assert!(!tracker.update(0.9, 0.5));
        }
        assert!(tracker.update(0.9, 0.5));
        assert!(tracker.is_ready());
        assert!(!tracker.update(0.1, 0.5));
        assert_eq!(tracker.timer(), 0.0);
    }

    #[test]
    fn window_decays_at_half_rate() {
        let mut window = ReadyWindow::new(8.0, 4.0);
        window.update(true, 4.0, 4.0);
        window.update(false, 2.0, 6.0);
        match window.status() {
            ReadyStatus::Charging {
                progress,
                seconds_left,
            } => {
                assert!((progress - 3.0 / 8.0).abs() < 1e-12);
                assert!((seconds_left - 5.0).abs() < 1e-12);
            }
            ReadyStatus::Ready => panic!("should still be charging"),
        }
        window.update(false, 100.0, 106.0);
        assert!(matches!(
            window.status(),
            ReadyStatus::Charging { progress, .. } if progress == 0.0
        ));
    }

    #[test]
    fn window_holds_then_logs() {
        let mut window = ReadyWindow::new(8.0, 4.0);
        let mut now = 0.0;
        for _ in 0..8 {
            now += 1.0;
            window.update(true, 1.0, now);
        }
        assert!(window.is_ready());

        // Focus no longer matters while held.
        now += 3.0;
        assert_eq!(window.update(false, 3.0, now), ReadyStatus::Ready);
        assert!(window.log().is_empty());

        now += 1.0;
        let status = window.update(false, 1.0, now);
        assert!(matches!(status, ReadyStatus::Charging { progress, .. } if progress == 0.0));
        assert_eq!(
            window.log().to_vec(),
            vec![ReadyLogEntry {
                started_at: 8.0,
                held: 4.0
            }]
        );
    }

    #[test]
    fn log_records_window_start_and_actual_hold() {
        let mut window = ReadyWindow::new(1.0, 2.0);
        window.update(true, 1.0, 100.0);
        assert!(window.is_ready());
        window.update(true, 1.5, 101.5);
        // Coarse ticks overshoot the hold; the log keeps what really happened.
        window.update(true, 1.5, 103.0);
        let entry = *window.log().last().unwrap();
        assert_eq!(entry.started_at, 100.0);
        assert_eq!(entry.held, 3.0);
    }

    #[test]
    fn flag_beats_attention() {
        assert!(is_focused(Some(true), 0.0, 70.0));
        assert!(!is_focused(Some(false), 100.0, 70.0));
        assert!(is_focused(None, 70.0, 70.0));
        assert!(!is_focused(None, 69.9, 70.0));
    }
}
