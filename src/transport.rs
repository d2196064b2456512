//! Focus scores between processes, over loopback UDP.
//!
//! Delivery is best effort: no acknowledgement, no retry, no ordering. The
//! producer fires one datagram per consumer per tick and never lets a send
//! failure stop its loop. Consumers poll without blocking and keep their last
//! value when nothing (or nothing valid) arrived; see [`HeldFocus`].
//!
//! Payloads are ASCII:
//!
//! ```text
//! game:       0.734
//! dashboard:  0.7340,1
//! commands:   restart | quit | calibrate
//! ```

use crate::clock::Seconds;

use log::{debug, info, warn};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt, value, verify},
    number::complete::double,
    sequence::{delimited, pair, preceded},
    Finish, IResult,
};
use std::{
    borrow::Cow,
    fmt, io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    str::FromStr,
};

/// Producer to race.
pub const DEFAULT_GAME_PORT: u16 = 5005;
/// Producer to dashboard.
pub const DEFAULT_DASHBOARD_PORT: u16 = 5006;
/// Dashboard to race.
pub const DEFAULT_COMMAND_PORT: u16 = 5007;

const MAX_DATAGRAM: usize = 1024;

/// Errors from the UDP channels.
#[derive(Debug)]
pub enum TransportError {
    /// Returned when binding or sending on a socket fails.
    IoError(io::Error),
    /// An address that does not resolve.
    InvalidAddress(String),
    /// A payload that is not a valid message.
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::IoError(error) => Cow::from(format!("socket error: {}", error)),
            Self::InvalidAddress(addr) => Cow::from(format!("cannot resolve address {}", addr)),
            Self::Malformed(payload) => Cow::from(format!("malformed payload {:?}", payload)),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

fn resolve(addr: impl ToSocketAddrs + fmt::Debug) -> Result<SocketAddr, TransportError> {
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TransportError::InvalidAddress(format!("{:?}", addr)))
}

/// Which kind of consumer a destination is, and so which encoding it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bare score.
    Game,
    /// Four-decimal score plus ready flag.
    Dashboard,
}

impl Role {
    /// The payload this role expects.
    pub fn encode(&self, score: f64, ready: bool) -> String {
        match self {
            Self::Game => FocusMessage::score_only(score).to_string(),
            Self::Dashboard => FocusMessage::with_ready(score, ready).to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game => write!(f, "game"),
            Self::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// One focus update on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusMessage {
    /// In `[0, 1]`.
    pub score: f64,
    /// `None` when the sender did not include a flag.
    pub ready: Option<bool>,
}

impl FocusMessage {
    /// A message without a ready flag, as the race receives.
    pub fn score_only(score: f64) -> Self {
        Self { score, ready: None }
    }

    /// A message with a ready flag, as the dashboard receives.
    pub fn with_ready(score: f64, ready: bool) -> Self {
        Self {
            score,
            ready: Some(ready),
        }
    }
}

/// `0.734` or `0.7340,1`.
impl fmt::Display for FocusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ready {
            None => write!(f, "{}", self.score),
            Some(ready) => write!(f, "{:.4},{}", self.score, u8::from(ready)),
        }
    }
}

fn parse_score(s: &str) -> IResult<&str, f64> {
    verify(double, |v: &f64| v.is_finite() && (0.0..=1.0).contains(v))(s)
}

fn parse_flag(s: &str) -> IResult<&str, bool> {
    preceded(
        char(','),
        alt((value(false, char('0')), value(true, char('1')))),
    )(s)
}

fn parse_message(s: &str) -> IResult<&str, FocusMessage> {
    all_consuming(delimited(
        multispace0,
        map(pair(parse_score, opt(parse_flag)), |(score, ready)| {
            FocusMessage { score, ready }
        }),
        multispace0,
    ))(s)
}

impl FromStr for FocusMessage {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_message(s)
            .finish()
            .map(|(_, msg)| msg)
            .map_err(|_| TransportError::Malformed(s.to_owned()))
    }
}

impl TryFrom<&[u8]> for FocusMessage {
    type Error = TransportError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(bytes)
            .map_err(|_| TransportError::Malformed(String::from_utf8_lossy(bytes).into_owned()))?
            .parse()
    }
}

/// Sends every score to every registered consumer.
pub struct FocusSender {
    socket: UdpSocket,
    destinations: Vec<(Role, SocketAddr)>,
    sent: u64,
    failed: u64,
}

impl FocusSender {
    /// Binds an ephemeral local port.
    pub fn new() -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            destinations: Vec::new(),
            sent: 0,
            failed: 0,
        })
    }

    /// Resolves `addr` and sends future scores there as `role`.
    pub fn add_destination(
        &mut self,
        role: Role,
        addr: impl ToSocketAddrs + fmt::Debug,
    ) -> Result<(), TransportError> {
        let addr = resolve(addr)?;
        info!("Sending {} messages to {}", role, addr);
        self.destinations.push((role, addr));
        Ok(())
    }

    /// Every destination with its role.
    pub fn destinations(&self) -> &[(Role, SocketAddr)] {
        &self.destinations
    }

    /// Sends one datagram per destination and returns how many went out.
    /// Failures are logged and counted, never returned.
    pub fn send(&mut self, score: f64, ready: bool) -> usize {
        let mut delivered = 0;
        for (role, addr) in &self.destinations {
            let payload = role.encode(score, ready);
            match self.socket.send_to(payload.as_bytes(), addr) {
                Ok(_) => delivered += 1,
                Err(e) => {
                    self.failed += 1;
                    debug!("Send to {} ({}) failed: {}", addr, role, e);
                }
            }
        }
        self.sent += delivered as u64;
        delivered
    }

    /// Datagrams sent and send failures so far.
    pub fn counts(&self) -> (u64, u64) {
        (self.sent, self.failed)
    }
}

/// Drains every datagram waiting on `socket`, feeding each payload to `f`.
fn drain(socket: &UdpSocket, buffer: &mut [u8], mut f: impl FnMut(&[u8])) {
    loop {
        match socket.recv_from(buffer) {
            Ok((len, _addr)) => f(&buffer[..len]),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                // e.g. ICMP port unreachable surfacing on some platforms
                debug!("Receive failed: {}", e);
                break;
            }
        }
    }
}

fn bind_nonblocking(addr: impl ToSocketAddrs + fmt::Debug) -> Result<UdpSocket, TransportError> {
    let addr = resolve(addr)?;
    let socket = UdpSocket::bind(addr)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// The consumer end of the focus channel.
pub struct FocusReceiver {
    socket: UdpSocket,
    buffer: Vec<u8>,
    malformed: u64,
}

impl FocusReceiver {
    /// Binds a non-blocking socket on `addr`.
    pub fn bind(addr: impl ToSocketAddrs + fmt::Debug) -> Result<Self, TransportError> {
        let socket = bind_nonblocking(addr)?;
        info!("Listening for focus on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM],
            malformed: 0,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// The newest valid message received since the last poll, if any.
    /// Malformed payloads are dropped with a warning.
    pub fn poll(&mut self) -> Option<FocusMessage> {
        let mut newest = None;
        let mut malformed = 0;
        drain(&self.socket, &mut self.buffer, |payload| {
            match FocusMessage::try_from(payload) {
                Ok(msg) => newest = Some(msg),
                Err(e) => {
                    malformed += 1;
                    warn!("Dropping {}", e);
                }
            }
        });
        self.malformed += malformed;
        newest
    }

    /// Payloads dropped since bind.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

/// How a consumer treats silence from the producer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldPolicy {
    /// Seconds without a message before the held value counts as stale.
    pub stale_after: Seconds,
    /// Where a stale value drifts to.
    pub neutral: f64,
    /// Drift speed in score units per second; `None` snaps to `neutral`.
    pub decay_per_sec: Option<f64>,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            stale_after: 2.0,
            neutral: 0.5,
            decay_per_sec: Some(0.05),
        }
    }
}

/// A consumer's current idea of the focus score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldFocus {
    /// Score shown, in `[0, 1]`.
    pub score: f64,
    /// Last ready flag heard, if any.
    pub ready: Option<bool>,
    /// When the last valid message arrived.
    pub last_message_at: Option<Seconds>,
    /// When this value was computed.
    pub updated_at: Seconds,
}

impl HeldFocus {
    /// Nothing heard yet; reads as `policy.neutral`.
    pub fn initial(policy: &HoldPolicy, now: Seconds) -> Self {
        Self {
            score: policy.neutral,
            ready: None,
            last_message_at: None,
            updated_at: now,
        }
    }

    /// A fresh message replaces the value. Silence keeps it until it goes
    /// stale, after which it drifts to the neutral score and the ready flag
    /// is forgotten.
    pub fn step(
        previous: HeldFocus,
        message: Option<FocusMessage>,
        now: Seconds,
        policy: &HoldPolicy,
    ) -> HeldFocus {
        if let Some(msg) = message {
            return HeldFocus {
                score: msg.score,
                ready: msg.ready,
                last_message_at: Some(now),
                updated_at: now,
            };
        }

        if previous.is_live(now, policy) {
            return HeldFocus {
                updated_at: now,
                ..previous
            };
        }

        let score = match policy.decay_per_sec {
            Some(rate) => {
                // Only time spent stale counts toward the drift.
                let stale_since = previous
                    .last_message_at
                    .map_or(previous.updated_at, |at| {
                        previous.updated_at.max(at + policy.stale_after)
                    });
                let step = rate * (now - stale_since).max(0.0);
                let gap = policy.neutral - previous.score;
                previous.score + gap.clamp(-step, step)
            }
            None => policy.neutral,
        };
        HeldFocus {
            score,
            ready: None,
            last_message_at: previous.last_message_at,
            updated_at: now,
        }
    }

    /// Whether a message arrived within `policy.stale_after`.
    pub fn is_live(&self, now: Seconds, policy: &HoldPolicy) -> bool {
        self.last_message_at
            .is_some_and(|at| now - at < policy.stale_after)
    }
}

/// Out-of-band instructions from the dashboard to the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reset the race to the menu.
    Restart,
    /// Close the race.
    Quit,
    /// Start a calibration run.
    Calibrate,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Restart => "restart",
            Self::Quit => "quit",
            Self::Calibrate => "calibrate",
        };
        write!(f, "{}", word)
    }
}

fn parse_command(s: &str) -> IResult<&str, Command> {
    all_consuming(delimited(
        multispace0,
        alt((
            value(Command::Restart, tag_no_case("restart")),
            value(Command::Quit, tag_no_case("quit")),
            value(Command::Calibrate, tag_no_case("calibrate")),
        )),
        multispace0,
    ))(s)
}

impl FromStr for Command {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s)
            .finish()
            .map(|(_, cmd)| cmd)
            .map_err(|_| TransportError::Malformed(s.to_owned()))
    }
}

/// Sends [`Command`]s to the race.
pub struct CommandSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl CommandSender {
    /// A sender on an ephemeral port, aimed at `target`.
    pub fn new(target: impl ToSocketAddrs + fmt::Debug) -> Result<Self, TransportError> {
        Ok(Self {
            socket: UdpSocket::bind("0.0.0.0:0")?,
            target: resolve(target)?,
        })
    }

    /// Fire and forget; an error only means the datagram never left.
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        self.socket
            .send_to(command.to_string().as_bytes(), self.target)?;
        info!("Sent {} to {}", command, self.target);
        Ok(())
    }
}

/// The race end of the command channel.
pub struct CommandReceiver {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl CommandReceiver {
    /// Binds a non-blocking socket on `addr`.
    pub fn bind(addr: impl ToSocketAddrs + fmt::Debug) -> Result<Self, TransportError> {
        let socket = bind_nonblocking(addr)?;
        info!("Listening for commands on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Every valid command waiting, oldest first. Unknown commands are
    /// dropped with a warning.
    pub fn poll(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        drain(&self.socket, &mut self.buffer, |payload| {
            match String::from_utf8_lossy(payload).parse() {
                Ok(cmd) => commands.push(cmd),
                Err(e) => warn!("Ignoring command: {}", e),
            }
        });
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn test_encode() {
        assert_eq!(Role::Game.encode(0.734, true), "0.734");
        assert_eq!(Role::Dashboard.encode(0.734, true), "0.7340,1");
        assert_eq!(Role::Dashboard.encode(0.0, false), "0.0000,0");
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            "0.7340,1".parse::<FocusMessage>().unwrap(),
            FocusMessage::with_ready(0.734, true)
        );
        assert_eq!(
            "0.5,0\n".parse::<FocusMessage>().unwrap(),
            FocusMessage::with_ready(0.5, false)
        );
        assert_eq!(
            "1".parse::<FocusMessage>().unwrap(),
            FocusMessage::score_only(1.0)
        );
        assert_eq!(
            " 0.25 ".parse::<FocusMessage>().unwrap(),
            FocusMessage::score_only(0.25)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for bad in ["", "abc", "1.5", "-0.1", "nan", "inf", "0.5,2", "0.5,", "0.5;1", "0.5,1,1"] {
            assert!(
                matches!(bad.parse::<FocusMessage>(), Err(TransportError::Malformed(_))),
                "{:?} parsed",
                bad
            );
        }
        assert!(FocusMessage::try_from(&[0xff, 0xfe][..]).is_err());
    }

    #[test]
    fn test_commands() {
        for cmd in [Command::Restart, Command::Quit, Command::Calibrate] {
            assert_eq!(cmd.to_string().parse::<Command>().unwrap(), cmd);
        }
        assert_eq!("QUIT\n".parse::<Command>().unwrap(), Command::Quit);
        assert!("pause".parse::<Command>().is_err());
    }

    fn settle() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn test_loopback_roles() {
        let mut game = FocusReceiver::bind("127.0.0.1:0").unwrap();
        let mut dash = FocusReceiver::bind("127.0.0.1:0").unwrap();
        let mut sender = FocusSender::new().unwrap();
        sender
            .add_destination(Role::Game, game.local_addr().unwrap())
            .unwrap();
        sender
            .add_destination(Role::Dashboard, dash.local_addr().unwrap())
            .unwrap();

        assert!(game.poll().is_none());
        assert_eq!(sender.send(0.25, false), 2);
        assert_eq!(sender.send(0.75, true), 2);
        settle();

        assert_eq!(game.poll(), Some(FocusMessage::score_only(0.75)));
        assert_eq!(dash.poll(), Some(FocusMessage::with_ready(0.75, true)));
        assert!(game.poll().is_none());
        assert_eq!(sender.counts(), (4, 0));
    }

    #[test]
    fn test_malformed_is_dropped() {
        let mut rx = FocusReceiver::bind("127.0.0.1:0").unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = rx.local_addr().unwrap();
        raw.send_to(b"0.4", addr).unwrap();
        raw.send_to(b"hello", addr).unwrap();
        settle();
        assert_eq!(rx.poll(), Some(FocusMessage::score_only(0.4)));
        assert_eq!(rx.malformed(), 1);
    }

    #[test]
    fn test_command_loopback() {
        let mut rx = CommandReceiver::bind("127.0.0.1:0").unwrap();
        let tx = CommandSender::new(rx.local_addr().unwrap()).unwrap();
        tx.send(Command::Calibrate).unwrap();
        tx.send(Command::Quit).unwrap();
        settle();
        assert_eq!(rx.poll(), vec![Command::Calibrate, Command::Quit]);
        assert!(rx.poll().is_empty());
    }

    #[test]
    fn test_bad_address() {
        assert!(matches!(
            CommandSender::new("no-such-host.invalid:1"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_hold_then_decay() {
        let policy = HoldPolicy::default();
        let start = HeldFocus::initial(&policy, 0.0);
        assert_eq!(start.score, 0.5);

        let fresh = HeldFocus::step(start, Some(FocusMessage::with_ready(0.9, true)), 1.0, &policy);
        assert_eq!(fresh.score, 0.9);
        assert_eq!(fresh.ready, Some(true));

        // Held while live.
        let held = HeldFocus::step(fresh, None, 2.5, &policy);
        assert_eq!(held.score, 0.9);
        assert_eq!(held.ready, Some(true));

        // Stale from 3.0: drifts at 0.05 per second toward 0.5.
        let drifting = HeldFocus::step(held, None, 4.5, &policy);
        assert!((drifting.score - 0.825).abs() < 1e-12);
        assert_eq!(drifting.ready, None);

        let settled = HeldFocus::step(drifting, None, 100.0, &policy);
        assert_eq!(settled.score, 0.5);
    }

    #[test]
    fn test_decay_starts_when_stale() {
        let policy = HoldPolicy::default();
        let fresh = HeldFocus::step(
            HeldFocus::initial(&policy, 0.0),
            Some(FocusMessage::score_only(0.9)),
            1.0,
            &policy,
        );

        // One long gap: the two live seconds do not count.
        let late = HeldFocus::step(fresh, None, 5.0, &policy);
        assert!((late.score - 0.8).abs() < 1e-12);

        // Same end point in small steps.
        let mut stepped = fresh;
        for i in 1..=40 {
            stepped = HeldFocus::step(stepped, None, 1.0 + i as f64 * 0.1, &policy);
        }
        assert!((stepped.score - late.score).abs() < 1e-9);
    }

    #[test]
    fn test_hold_snap() {
        let policy = HoldPolicy {
            decay_per_sec: None,
            ..HoldPolicy::default()
        };
        let fresh = HeldFocus::step(
            HeldFocus::initial(&policy, 0.0),
            Some(FocusMessage::score_only(0.1)),
            0.0,
            &policy,
        );
        assert_eq!(HeldFocus::step(fresh, None, 1.0, &policy).score, 0.1);
        assert_eq!(HeldFocus::step(fresh, None, 3.0, &policy).score, 0.5);
    }
}
