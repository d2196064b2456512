//! The observer dashboard. Shows the player's attention and whether they
//! have held focus long enough to count as ready, and can send commands to
//! the race.

use clap::Parser;
use crossterm::event::KeyCode;
use focusrace::{
    args::DashboardArgs,
    clock::{Clock, Seconds, SystemClock},
    config::FocusConfig,
    gui::{draw_dashboard, fold_until_stop, DashboardView},
    history::BoundedHistory,
    readiness::{is_focused, ReadyWindow},
    transport::{Command, CommandSender, FocusReceiver, HeldFocus, HoldPolicy},
};

use log::{error, info, warn};
use std::{ops::ControlFlow, process::exit, time::Duration};

// Example:
// cargo run --bin dashboard -- --ready-seconds 8 --ready-hold 4

/// Points kept on the attention chart.
const TRACE_LEN: usize = 600;
/// Attention shown before anything arrives.
const INITIAL_ATTENTION: f64 = 50.0;

struct Dashboard<C: Clock> {
    clock: C,
    receiver: FocusReceiver,
    commands: Option<CommandSender>,
    held: HeldFocus,
    policy: HoldPolicy,
    /// Display EMA of attention, 0 to 100.
    attention: f64,
    alpha: f64,
    focus_threshold: f64,
    window: ReadyWindow,
    trace: BoundedHistory<(f64, f64)>,
    started: Seconds,
    last_tick: Seconds,
}

impl<C: Clock> Dashboard<C> {
    fn send(&self, command: Command) {
        match &self.commands {
            Some(sender) => {
                if let Err(e) = sender.send(command) {
                    warn!("Could not send {}: {}", command, e);
                }
            }
            None => warn!("No command channel, {} not sent", command),
        }
    }

    fn tick(&mut self) {
        let now = self.clock.now();
        let dt = (now - self.last_tick).max(0.0);
        self.last_tick = now;

        let message = self.receiver.poll();
        self.held = HeldFocus::step(self.held, message, now, &self.policy);

        let target = self.held.score * 100.0;
        self.attention = self.alpha * target + (1.0 - self.alpha) * self.attention;

        let focused = is_focused(self.held.ready, self.attention, self.focus_threshold);
        self.window.update(focused, dt, now);
        self.trace.push((now - self.started, self.attention));
    }

    fn step(&mut self, key: Option<KeyCode>) -> ControlFlow<()> {
        match key {
            Some(KeyCode::Char('q')) | Some(KeyCode::Esc) => return ControlFlow::Break(()),
            Some(KeyCode::Char('r')) => self.send(Command::Restart),
            Some(KeyCode::Char('c')) => self.send(Command::Calibrate),
            Some(KeyCode::Char('x')) => self.send(Command::Quit),
            _ => {}
        }
        self.tick();
        ControlFlow::Continue(())
    }
}

fn main() {
    env_logger::init();
    let args = DashboardArgs::parse();

    let mut config = match FocusConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config: {}", e);
            exit(1);
        }
    };
    if let Some(port) = args.port {
        config.net.dashboard_port = port;
    }
    if let Some(host) = &args.race_host {
        config.net.host = host.clone();
    }
    if let Some(port) = args.command_port {
        config.net.command_port = port;
    }
    let dash = &mut config.dashboard;
    if let Some(threshold) = args.focus_threshold {
        dash.focus_threshold = f64::from(threshold);
    }
    if let Some(seconds) = args.ready_seconds {
        dash.ready_seconds = seconds;
    }
    if let Some(hold) = args.ready_hold {
        dash.ready_hold = hold;
    }

    let receiver = match FocusReceiver::bind(("0.0.0.0", config.net.dashboard_port)) {
        Ok(receiver) => receiver,
        Err(e) => {
            error!(
                "Could not listen on port {}: {}",
                config.net.dashboard_port, e
            );
            error!("  - is another dashboard already running?");
            exit(1);
        }
    };
    let commands = match CommandSender::new((config.net.host.as_str(), config.net.command_port)) {
        Ok(sender) => Some(sender),
        Err(e) => {
            warn!("Race commands disabled: {}", e);
            None
        }
    };

    let clock = SystemClock;
    let now = clock.now();
    let dash = &config.dashboard;
    let policy = dash.hold_policy();
    let dashboard = Dashboard {
        clock,
        receiver,
        commands,
        held: HeldFocus::initial(&policy, now),
        policy,
        attention: INITIAL_ATTENTION,
        alpha: dash.smoothing_alpha.clamp(0.0, 1.0),
        focus_threshold: dash.focus_threshold,
        window: ReadyWindow::new(dash.ready_seconds, dash.ready_hold),
        trace: BoundedHistory::new(TRACE_LEN),
        started: now,
        last_tick: now,
    };

    let tick_rate = Duration::from_secs_f64(1.0 / dash.update_hz.max(1.0));
    let res = fold_until_stop(dashboard, tick_rate, Dashboard::step, |frame, dashboard| {
        let trace = dashboard.trace.to_vec();
        let log = dashboard.window.log().to_vec();
        draw_dashboard(
            frame,
            &DashboardView {
                attention: dashboard.attention,
                focus_threshold: dashboard.focus_threshold,
                live: dashboard
                    .held
                    .is_live(dashboard.clock.now(), &dashboard.policy),
                ready_flag: dashboard.held.ready,
                status: dashboard.window.status(),
                trace: &trace,
                log: &log,
            },
        )
    });

    match res {
        Ok(dashboard) => info!(
            "Dashboard closed after {} ready windows",
            dashboard.window.log().len()
        ),
        Err(e) => {
            error!("Terminal error: {}", e);
            exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusrace::{
        clock::ManualClock,
        readiness::ReadyStatus,
        transport::{CommandReceiver, FocusSender, Role},
    };
    use std::thread;

    fn dashboard(clock: &ManualClock) -> (Dashboard<ManualClock>, std::net::SocketAddr) {
        let receiver = FocusReceiver::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let policy = HoldPolicy::default();
        let dashboard = Dashboard {
            clock: clock.clone(),
            receiver,
            commands: None,
            held: HeldFocus::initial(&policy, clock.now()),
            policy,
            attention: INITIAL_ATTENTION,
            alpha: 0.15,
            focus_threshold: 70.0,
            window: ReadyWindow::new(8.0, 4.0),
            trace: BoundedHistory::new(TRACE_LEN),
            started: clock.now(),
            last_tick: clock.now(),
        };
        (dashboard, addr)
    }

    #[test]
    fn silence_drifts_to_neutral() {
        let clock = ManualClock::new(0.0);
        let (mut dash, _) = dashboard(&clock);
        for _ in 0..50 {
            clock.advance(0.1);
            dash.step(None);
        }
        assert!((dash.attention - 50.0).abs() < 1e-9);
        assert!(!dash.window.is_ready());
        assert_eq!(dash.trace.len(), 50);
    }

    #[test]
    fn ready_flag_fills_the_window() {
        let clock = ManualClock::new(0.0);
        let (mut dash, addr) = dashboard(&clock);
        let mut sender = FocusSender::new().unwrap();
        sender.add_destination(Role::Dashboard, addr).unwrap();

        for _ in 0..85 {
            sender.send(0.9, true);
            thread::sleep(Duration::from_millis(1));
            clock.advance(0.1);
            dash.step(None);
        }
        assert_eq!(dash.window.status(), ReadyStatus::Ready);
        assert!(dash.attention > 70.0);
    }

    #[test]
    fn keys_send_commands() {
        let clock = ManualClock::new(0.0);
        let (mut dash, _) = dashboard(&clock);
        let mut race = CommandReceiver::bind("127.0.0.1:0").unwrap();
        dash.commands = Some(CommandSender::new(race.local_addr().unwrap()).unwrap());

        dash.step(Some(KeyCode::Char('r')));
        dash.step(Some(KeyCode::Char('x')));
        assert_eq!(dash.step(Some(KeyCode::Char('q'))), ControlFlow::Break(()));

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(race.poll());
            if received.len() == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received, vec![Command::Restart, Command::Quit]);
    }
}
