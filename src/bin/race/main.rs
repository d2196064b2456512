//! The race. A car crosses the screen while the player's focus stays high,
//! and finished races go on the leaderboard.
//!
//! Focus normally comes from the server over UDP. With `--local` a synthetic
//! pipeline runs in this process instead, which also makes beta power
//! available for calibration.

use clap::Parser;
use crossterm::event::KeyCode;
use focusrace::{
    args::RaceArgs,
    clock::{Clock, Seconds, SystemClock},
    config::FocusConfig,
    focus_scorer::FocusScorer,
    gui::{draw_race, fold_until_stop, RaceView},
    leaderboard::{Leaderboard, RaceRecord},
    pipeline::FocusPipeline,
    race::{GameState, RaceStateMachine},
    signal_source::SourceConfig,
    synthetic_source::SyntheticSource,
    transport::{Command, CommandReceiver, FocusMessage, FocusReceiver, HeldFocus, HoldPolicy},
};

use log::{error, info, warn};
use std::{ops::ControlFlow, process::exit, time::Duration};

// Example:
// cargo run --bin race -- --player Ada
// cargo run --bin race -- --player Ada --local

const LEADERBOARD_ROWS: usize = 10;

/// Where focus scores come from.
enum Feed {
    Network(FocusReceiver),
    Local(Box<FocusPipeline<SyntheticSource>>),
}

struct Race<C: Clock> {
    machine: RaceStateMachine<C>,
    clock: C,
    board: Leaderboard,
    player: String,
    feed: Feed,
    commands: Option<CommandReceiver>,
    held: HeldFocus,
    policy: HoldPolicy,
    last_tick: Seconds,
    recommended: Option<f64>,
    skip_calibration: bool,
    top: Vec<RaceRecord>,
}

impl<C: Clock + Clone> Race<C> {
    fn can_calibrate(&self) -> bool {
        matches!(self.feed, Feed::Local(_)) && !self.skip_calibration
    }

    fn begin(&mut self) {
        if matches!(self.machine.state(), GameState::Menu | GameState::Finished) {
            self.machine.start_race();
        }
    }

    fn calibrate(&mut self) {
        if self.can_calibrate() {
            self.machine.start_calibration();
        } else {
            warn!("Calibration needs beta power; run the race with --local");
        }
    }

    fn restart(&mut self) {
        info!("Back to the menu");
        self.machine.reset_to_menu();
    }

    /// Applies one control input. `Break` ends the game.
    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Restart => self.restart(),
            Command::Calibrate => self.calibrate(),
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn on_key(&mut self, key: KeyCode) -> ControlFlow<()> {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => return ControlFlow::Break(()),
            KeyCode::Char(' ') | KeyCode::Enter => self.begin(),
            KeyCode::Char('r') => return self.handle(Command::Restart),
            KeyCode::Char('c') => return self.handle(Command::Calibrate),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    /// Reads the feed, then advances calibration or the car.
    fn tick(&mut self) {
        let now = self.clock.now();
        let dt = (now - self.last_tick).max(0.0);
        self.last_tick = now;

        let message = match &mut self.feed {
            Feed::Network(receiver) => receiver.poll(),
            Feed::Local(pipeline) => {
                let out = pipeline.tick(dt);
                self.machine.add_calibration_sample(out.beta_power);
                Some(FocusMessage::with_ready(out.score, out.ready))
            }
        };
        self.held = HeldFocus::step(self.held, message, now, &self.policy);

        match self.machine.state() {
            GameState::Calibrating if self.machine.is_calibration_complete() => {
                self.recommended = Some(self.machine.finish_calibration());
                self.machine.start_race();
            }
            GameState::Racing => {
                self.machine.update_focus(self.held.score);
                self.machine.update(dt);
                if self.machine.state() == GameState::Finished {
                    self.record();
                }
            }
            _ => {}
        }
    }

    fn record(&mut self) {
        let data = self.machine.get_game_data();
        if let Err(e) = self
            .board
            .add_record(&self.player, data.race_time, data.max_focus_streak)
        {
            warn!("Could not save the leaderboard: {}", e);
        }
        self.top = self.board.top_records(LEADERBOARD_ROWS).to_vec();
    }

    fn step(&mut self, key: Option<KeyCode>) -> ControlFlow<()> {
        let commands = self
            .commands
            .as_mut()
            .map(CommandReceiver::poll)
            .unwrap_or_default();
        for command in commands {
            info!("Received {:?}", command);
            if self.handle(command).is_break() {
                return ControlFlow::Break(());
            }
        }
        if let Some(key) = key {
            if self.on_key(key).is_break() {
                return ControlFlow::Break(());
            }
        }
        self.tick();
        ControlFlow::Continue(())
    }

    fn shutdown(&mut self) {
        if let Feed::Local(pipeline) = &mut self.feed {
            pipeline.shutdown();
        }
    }
}

fn main() {
    env_logger::init();
    let args = RaceArgs::parse();

    let mut config = match FocusConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config: {}", e);
            exit(1);
        }
    };
    if let Some(port) = args.port {
        config.net.game_port = port;
    }
    if let Some(port) = args.command_port {
        config.net.command_port = port;
    }

    let feed = if args.local {
        let scorer = FocusScorer::new(config.extractor.clone(), config.reset_policy);
        let mut pipeline = FocusPipeline::new(SyntheticSource::new(), scorer, &config);
        if let Err(e) = pipeline.start(&SourceConfig::synthetic()) {
            error!("Could not start the synthetic source: {}", e);
            exit(1);
        }
        Feed::Local(Box::new(pipeline))
    } else {
        match FocusReceiver::bind(("0.0.0.0", config.net.game_port)) {
            Ok(receiver) => Feed::Network(receiver),
            Err(e) => {
                error!("Could not listen on port {}: {}", config.net.game_port, e);
                error!("  - is another race already running?");
                exit(1);
            }
        }
    };

    // The race still works without remote control.
    let commands = match CommandReceiver::bind(("0.0.0.0", config.net.command_port)) {
        Ok(receiver) => Some(receiver),
        Err(e) => {
            warn!("No command channel on port {}: {}", config.net.command_port, e);
            None
        }
    };

    let mut machine = RaceStateMachine::new(config.race.clone());
    if let Some(threshold) = args.threshold {
        machine.set_focus_threshold(threshold.clamp(0.0, 1.0));
    }

    let board = Leaderboard::open(&args.leaderboard);
    let top = board.top_records(LEADERBOARD_ROWS).to_vec();
    let clock = SystemClock;
    let policy = config.dashboard.hold_policy();
    let now = clock.now();

    let race = Race {
        machine,
        clock,
        board,
        player: args.player,
        feed,
        commands,
        held: HeldFocus::initial(&policy, now),
        policy,
        last_tick: now,
        recommended: None,
        skip_calibration: args.skip_calibration,
        top,
    };

    let tick = config.race.tick_interval();
    let res = fold_until_stop(race, tick, Race::step, |frame, race| {
        let data = race.machine.get_game_data();
        draw_race(
            frame,
            &RaceView {
                data: &data,
                player: &race.player,
                calibration_progress: race.machine.calibration_progress(),
                recommended_threshold: race.recommended,
                live: race.held.is_live(race.clock.now(), &race.policy),
                can_calibrate: race.can_calibrate(),
                top: &race.top,
            },
        )
    });

    match res {
        Ok(mut race) => {
            race.shutdown();
            if let Some(best) = race.board.records().first() {
                info!("Best time {:.2}s by {}", best.race_time, best.player_name);
            }
        }
        Err(e) => {
            error!("Terminal error: {}", e);
            exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusrace::{clock::ManualClock, race::RaceConfig, transport::FocusSender};
    use focusrace::transport::Role;
    use std::thread;
    use tempfile::tempdir;

    fn race(dir: &std::path::Path, clock: &ManualClock) -> (Race<ManualClock>, std::net::SocketAddr) {
        let receiver = FocusReceiver::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let policy = HoldPolicy::default();
        let race = Race {
            machine: RaceStateMachine::with_clock(RaceConfig::default(), clock.clone()),
            clock: clock.clone(),
            board: Leaderboard::open(dir.join("board.json")),
            player: "Ada".to_owned(),
            feed: Feed::Network(receiver),
            commands: None,
            held: HeldFocus::initial(&policy, clock.now()),
            policy,
            last_tick: clock.now(),
            recommended: None,
            skip_calibration: false,
            top: Vec::new(),
        };
        (race, addr)
    }

    #[test]
    fn keys_drive_the_menu() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(10.0);
        let (mut race, _) = race(dir.path(), &clock);

        assert_eq!(race.step(Some(KeyCode::Char(' '))), ControlFlow::Continue(()));
        assert_eq!(race.machine.state(), GameState::Racing);
        // Calibration needs the local pipeline.
        race.step(Some(KeyCode::Char('c')));
        assert_eq!(race.machine.state(), GameState::Racing);
        race.step(Some(KeyCode::Char('r')));
        assert_eq!(race.machine.state(), GameState::Menu);
        assert_eq!(race.step(Some(KeyCode::Char('q'))), ControlFlow::Break(()));
    }

    #[test]
    fn full_focus_finishes_and_records() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(10.0);
        let (mut race, addr) = race(dir.path(), &clock);
        let mut sender = FocusSender::new().unwrap();
        sender.add_destination(Role::Game, addr).unwrap();

        race.step(Some(KeyCode::Char(' ')));
        for _ in 0..2000 {
            sender.send(1.0, true);
            thread::sleep(Duration::from_millis(1));
            clock.advance(1.0 / 60.0);
            race.step(None);
            if race.machine.state() == GameState::Finished {
                break;
            }
        }
        assert_eq!(race.machine.state(), GameState::Finished);
        assert_eq!(race.board.records().len(), 1);
        assert_eq!(race.top[0].player_name, "Ada");
        assert!(race.board.best_time() > 0.0);
    }
}
