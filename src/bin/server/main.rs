//! The acquisition server. Reads EEG from a board or the synthetic
//! generator, scores focus every tick and sends it to the race and the
//! dashboard.

use clap::Parser;
use crossterm::event::KeyCode;
use focusrace::{
    args::ServerArgs,
    config::FocusConfig,
    cyton::CytonSource,
    focus_scorer::FocusScorer,
    gui::{device_selector, draw_server, fold_until_stop, ServerView},
    pipeline::{run_server_loop, FocusPipeline, PipelineOutput},
    signal_source::{BoardProfile, SignalSource, SourceConfig, SourceError},
    synthetic_source::SyntheticSource,
    transport::{FocusSender, Role, TransportError},
};

use log::{error, info, warn};
use std::{
    io::{self, BufRead},
    ops::ControlFlow,
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::spawn,
    time::{Duration, Instant},
};

// Example:
// RUST_LOG=info cargo run --bin server -- --demo --mode both
// cargo run --bin server -- --board cyton --serial-port /dev/ttyUSB0

/// Step applied to the raw threshold by the +/- keys.
const THRESHOLD_STEP: f64 = 5.0;

fn main() {
    env_logger::init();
    let args = ServerArgs::parse();

    let mut config = match FocusConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config: {}", e);
            exit(1);
        }
    };
    apply_args(&mut config, &args);

    let source_config = source_config(&args);
    config.extractor.sampling_rate = source_config.profile.sampling_rate();

    let sender = match build_sender(&config, &args) {
        Ok(sender) => sender,
        Err(e) => {
            error!("Could not set up the focus sender: {}", e);
            exit(1);
        }
    };

    let scorer = FocusScorer::new(config.extractor.clone(), config.reset_policy);
    if args.demo {
        run(SyntheticSource::new(), scorer, &source_config, &config, sender, args.headless);
    } else {
        run(CytonSource::new(), scorer, &source_config, &config, sender, args.headless);
    }
}

fn apply_args(config: &mut FocusConfig, args: &ServerArgs) {
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(rate) = args.update_rate {
        config.update_interval = rate;
    }
    if let Some(host) = &args.host {
        config.net.host = host.clone();
    }
    if let Some(port) = args.game_port {
        config.net.game_port = port;
    }
    if let Some(port) = args.dashboard_port {
        config.net.dashboard_port = port;
    }
}

/// The board to connect to. A hardware board with no link given gets the
/// serial device selector.
fn source_config(args: &ServerArgs) -> SourceConfig {
    if args.demo {
        return SourceConfig::synthetic();
    }

    let profile = BoardProfile::from(args.board);
    let mut serial_port = args.serial_port.clone();
    if serial_port.is_none() && args.mac_address.is_none() && !args.headless {
        match CytonSource::available_ports() {
            Ok(ports) => match device_selector(ports) {
                Ok(choice) => serial_port = choice,
                Err(e) => warn!("Device selector failed: {}", e),
            },
            Err(e) => warn!("Could not list serial ports: {}", e),
        }
    }

    SourceConfig {
        profile,
        serial_port,
        mac_address: args.mac_address.clone(),
    }
}

fn build_sender(config: &FocusConfig, args: &ServerArgs) -> Result<FocusSender, TransportError> {
    let mut sender = FocusSender::new()?;
    let host = &config.net.host;
    if args.mode.to_game() {
        sender.add_destination(Role::Game, (host.as_str(), config.net.game_port))?;
    }
    if args.mode.to_dashboard() {
        sender.add_destination(Role::Dashboard, (host.as_str(), config.net.dashboard_port))?;
    }
    Ok(sender)
}

fn fail(e: &SourceError) -> ! {
    error!("Could not start the signal source: {}", e);
    for hint in e.hints() {
        error!("  - {}", hint);
    }
    exit(1);
}

fn run<S: SignalSource>(
    source: S,
    scorer: FocusScorer,
    source_config: &SourceConfig,
    config: &FocusConfig,
    sender: FocusSender,
    headless: bool,
) {
    let mut pipeline = FocusPipeline::new(source, scorer, config);
    if let Err(e) = pipeline.start(source_config) {
        pipeline.shutdown();
        fail(&e);
    }
    let interval = Duration::from_secs_f64(config.update_interval.max(0.001));
    if headless {
        run_headless(pipeline, sender, interval);
    } else {
        run_tui(pipeline, sender, source_config.profile, interval);
    }
    info!("Server stopped");
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim(), "q" | "quit")
}

/// Clears `running` when a quit line arrives on `input`. A closed or
/// unreadable input only ends the watch; the server keeps going.
fn watch_for_quit<R: BufRead>(input: R, running: &AtomicBool) {
    for line in input.lines() {
        match line {
            Ok(line) if is_quit(&line) => {
                info!("Quit requested");
                running.store(false, Ordering::SeqCst);
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

/// Logs instead of drawing. Ctrl-C, or typing `q` and Enter, stops the loop
/// and releases the source.
fn run_headless<S: SignalSource>(
    mut pipeline: FocusPipeline<S>,
    mut sender: FocusSender,
    interval: Duration,
) {
    let running = Arc::new(AtomicBool::new(true));

    let stop = running.clone();
    if let Err(e) = ctrlc::set_handler(move || stop.store(false, Ordering::SeqCst)) {
        warn!("Could not install the Ctrl-C handler: {}", e);
    }
    let stop = running.clone();
    spawn(move || watch_for_quit(io::stdin().lock(), &stop));

    info!("Running headless, press Ctrl-C or type q and Enter to stop");
    let mut last_report = Instant::now();
    run_server_loop(&mut pipeline, interval, &running, |out: &PipelineOutput| {
        sender.send(out.score, out.ready);
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            info!(
                "beta {:.2}  score {:.3}  ready {}",
                out.beta_power, out.score, out.ready
            );
        }
        true
    });
}

struct Server<S> {
    pipeline: FocusPipeline<S>,
    sender: FocusSender,
    last_tick: Instant,
}

fn run_tui<S: SignalSource>(
    pipeline: FocusPipeline<S>,
    sender: FocusSender,
    profile: BoardProfile,
    interval: Duration,
) {
    let destinations: Vec<String> = sender
        .destinations()
        .iter()
        .map(|(role, addr)| format!("{} {}", role, addr))
        .collect();
    let source = profile.to_string();

    let server = Server {
        pipeline,
        sender,
        last_tick: Instant::now(),
    };
    let res = fold_until_stop(
        server,
        interval,
        |server, key| {
            match key {
                Some(KeyCode::Char('q')) | Some(KeyCode::Esc) => return ControlFlow::Break(()),
                Some(KeyCode::Char('r')) => {
                    info!("Resetting scores");
                    server.pipeline.reset();
                }
                Some(KeyCode::Char('+')) | Some(KeyCode::Char('=')) => {
                    let threshold = server.pipeline.threshold() + THRESHOLD_STEP;
                    server.pipeline.set_threshold(threshold);
                }
                Some(KeyCode::Char('-')) => {
                    let threshold = (server.pipeline.threshold() - THRESHOLD_STEP).max(THRESHOLD_STEP);
                    server.pipeline.set_threshold(threshold);
                }
                _ => {}
            }
            let now = Instant::now();
            let dt = now.duration_since(server.last_tick).as_secs_f64();
            server.last_tick = now;
            let out = server.pipeline.tick(dt);
            server.sender.send(out.score, out.ready);
            ControlFlow::Continue(())
        },
        |frame, server| {
            let (sent, failed) = server.sender.counts();
            draw_server(
                frame,
                &ServerView {
                    source: &source,
                    output: server.pipeline.last_output(),
                    threshold: server.pipeline.threshold(),
                    destinations: &destinations,
                    sent,
                    failed,
                },
            )
        },
    );

    match res {
        Ok(mut server) => server.pipeline.shutdown(),
        Err(e) => {
            error!("Terminal error: {}", e);
            exit(1);
        }
    }
}
