//! Commandline argument parsers using clap, one per FocusRace binary.

use crate::signal_source::BoardProfile;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Hardware boards selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BoardChoice {
    /// OpenBCI Cyton, 8 channels
    Cyton,
    /// Cyton with the Daisy module, 16 channels
    CytonDaisy,
    /// OpenBCI Ganglion, 4 channels over BLE
    Ganglion,
}

impl From<BoardChoice> for BoardProfile {
    fn from(value: BoardChoice) -> Self {
        match value {
            BoardChoice::Cyton => Self::Cyton,
            BoardChoice::CytonDaisy => Self::CytonDaisy,
            BoardChoice::Ganglion => Self::Ganglion,
        }
    }
}

/// Which consumers the server sends to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendMode {
    /// Only the race
    Game,
    /// Only the dashboard
    Dashboard,
    /// The race and the dashboard
    Both,
}

impl SendMode {
    /// Whether scores go to the race.
    pub fn to_game(&self) -> bool {
        matches!(self, Self::Game | Self::Both)
    }

    /// Whether scores go to the dashboard.
    pub fn to_dashboard(&self) -> bool {
        matches!(self, Self::Dashboard | Self::Both)
    }
}

/// Flags of the `server` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Reads EEG, scores focus and broadcasts it over UDP")]
pub struct ServerArgs {
    /// Use the synthetic signal generator instead of hardware
    #[arg(long)]
    pub demo: bool,

    /// Hardware board type
    #[arg(long, value_enum, default_value_t = BoardChoice::Cyton)]
    pub board: BoardChoice,

    /// Serial port of the board dongle, e.g. /dev/ttyUSB0 or COM3
    #[arg(long)]
    pub serial_port: Option<PathBuf>,

    /// Wireless address of the board, e.g. XX:XX:XX:XX:XX:XX
    #[arg(long)]
    pub mac_address: Option<String>,

    /// Raw beta power threshold for the scorer
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Seconds between updates
    #[arg(short = 'u', long)]
    pub update_rate: Option<f64>,

    /// Which consumers to send to
    #[arg(long, value_enum, default_value_t = SendMode::Both)]
    pub mode: SendMode,

    /// Host the consumers run on
    #[arg(long)]
    pub host: Option<String>,

    /// UDP port of the race
    #[arg(long)]
    pub game_port: Option<u16>,

    /// UDP port of the dashboard
    #[arg(long)]
    pub dashboard_port: Option<u16>,

    /// Log to the terminal instead of drawing a status screen
    #[arg(long)]
    pub headless: bool,

    /// RON config file; flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Flags of the `race` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Drives a car with your focus")]
pub struct RaceArgs {
    /// Name recorded on the leaderboard
    #[arg(short, long, default_value = "Player")]
    pub player: String,

    /// UDP port to receive focus scores on
    #[arg(long)]
    pub port: Option<u16>,

    /// UDP port to receive dashboard commands on
    #[arg(long)]
    pub command_port: Option<u16>,

    /// Leaderboard file
    #[arg(long, default_value = crate::leaderboard::DEFAULT_LEADERBOARD_PATH)]
    pub leaderboard: PathBuf,

    /// Normalized focus (0 to 1) needed to drive
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Run the synthetic signal pipeline in this process instead of
    /// listening for a server; enables calibration
    #[arg(long)]
    pub local: bool,

    /// Start racing without calibrating first
    #[arg(long)]
    pub skip_calibration: bool,

    /// RON config file; flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Flags of the `dashboard` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Shows focus and readiness to an observer")]
pub struct DashboardArgs {
    /// UDP port to receive focus scores on
    #[arg(long)]
    pub port: Option<u16>,

    /// Host the race runs on, for commands
    #[arg(long)]
    pub race_host: Option<String>,

    /// UDP port the race listens for commands on
    #[arg(long)]
    pub command_port: Option<u16>,

    /// Attention (0 to 100) that counts as focused when no ready flag is sent
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub focus_threshold: Option<u8>,

    /// Seconds of focus required to become ready
    #[arg(long)]
    pub ready_seconds: Option<f64>,

    /// Seconds ready is held
    #[arg(long)]
    pub ready_hold: Option<f64>,

    /// RON config file; flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let args = ServerArgs::parse_from(["server", "--demo"]);
        assert!(args.demo);
        assert_eq!(args.board, BoardChoice::Cyton);
        assert_eq!(args.mode, SendMode::Both);
        assert!(args.threshold.is_none());
    }

    #[test]
    fn server_hardware() {
        let args = ServerArgs::parse_from([
            "server",
            "--board",
            "cyton-daisy",
            "--serial-port",
            "/dev/ttyUSB0",
            "--mode",
            "dashboard",
            "-t",
            "55",
        ]);
        assert_eq!(BoardProfile::from(args.board), BoardProfile::CytonDaisy);
        assert_eq!(args.serial_port, Some(PathBuf::from("/dev/ttyUSB0")));
        assert!(!args.mode.to_game());
        assert!(args.mode.to_dashboard());
        assert_eq!(args.threshold, Some(55.0));
    }

    #[test]
    fn race_and_dashboard() {
        let race = RaceArgs::parse_from(["race", "--player", "Ada", "--skip-calibration"]);
        assert_eq!(race.player, "Ada");
        assert!(race.skip_calibration);
        assert_eq!(race.leaderboard, PathBuf::from("leaderboard.json"));

        let dash = DashboardArgs::parse_from(["dashboard", "--focus-threshold", "60"]);
        assert_eq!(dash.focus_threshold, Some(60));
        assert!(DashboardArgs::try_parse_from(["dashboard", "--focus-threshold", "101"]).is_err());
    }
}
