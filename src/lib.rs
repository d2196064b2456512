//! FocusRace turns a live EEG stream into a single "focus" number and lets a
//! player drive a race car with it.
//!
//! Three processes cooperate over local UDP:
//!
//! - the **server** reads samples from an OpenBCI board (or a synthetic
//!   generator), isolates the 13 to 30 Hz beta band, turns beta power into a
//!   focus score in `[0, 1]` and broadcasts it;
//! - the **race** moves a car forward only while the player's focus is high
//!   enough, and records finished races on a leaderboard;
//! - the **dashboard** shows an observer the player's attention and a
//!   hold-to-be-ready indicator, and can restart the race remotely.
//!
//! The scoring chain lives in [`beta_power`] and [`focus_scorer`], wired
//! together per tick by [`pipeline`]. The race rules are in [`race`], and
//! everything that crosses a socket is in [`transport`].

#![warn(missing_docs)]
pub mod args;
pub mod beta_power;
pub mod clock;
pub mod component;
pub mod config;
pub mod cyton;
pub mod filter;
pub mod focus_scorer;
pub mod gui;
pub mod history;
pub mod leaderboard;
pub mod packet_decoder;
pub mod pipeline;
pub mod race;
pub mod readiness;
pub mod signal_source;
pub mod synthetic_source;
pub mod transport;
