//! `SignalSource`
//!
//! The capability surface the focus pipeline needs from an EEG device: connect,
//! start, hand over blocks of multi-channel samples, stop, disconnect. The
//! synthetic generator and the OpenBCI serial adapter both implement it, and
//! the pipeline picks one at construction time.

use std::{borrow::Cow, fmt, path::PathBuf};

use log::warn;

/// Microvolts, or whatever unit the source reports.
pub type Sample = f64;

/// A 2-D block of samples, shape `(channel_count, sample_count)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBlock {
    channels: Vec<Vec<Sample>>,
}

impl SampleBlock {
    /// Builds a block from per-channel rows. Rows are truncated to the
    /// shortest one so every column is complete.
    pub fn from_channels(mut channels: Vec<Vec<Sample>>) -> Self {
        let shortest = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.truncate(shortest);
        }
        Self { channels }
    }

    /// Builds a block from per-timestep columns, each holding one value per
    /// channel.
    pub fn from_columns(columns: &[Vec<Sample>]) -> Self {
        let n_channels = columns.first().map(Vec::len).unwrap_or(0);
        let mut channels = vec![Vec::with_capacity(columns.len()); n_channels];
        for column in columns {
            for (ch, &v) in channels.iter_mut().zip(column.iter()) {
                ch.push(v);
            }
        }
        Self::from_channels(channels)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// True when the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// The samples of one channel.
    pub fn channel(&self, idx: usize) -> Option<&[Sample]> {
        self.channels.get(idx).map(Vec::as_slice)
    }

    /// Iterates over the block one timestep at a time, yielding the value of
    /// every channel at that step.
    pub fn columns(&self) -> impl Iterator<Item = Vec<Sample>> + '_ {
        (0..self.sample_count()).map(move |i| self.channels.iter().map(|ch| ch[i]).collect())
    }

    /// Keeps only the newest `n` samples of every channel.
    pub fn keep_last(&mut self, n: usize) {
        let len = self.sample_count();
        if len > n {
            for ch in self.channels.iter_mut() {
                ch.drain(..len - n);
            }
        }
    }
}

/// Which kind of board sits on the other end, and therefore how many channels
/// arrive at what rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BoardProfile {
    /// OpenBCI Cyton, 8 channels at 250 Hz over the USB dongle.
    Cyton,
    /// OpenBCI Cyton with the Daisy module, 16 channels at 125 Hz.
    CytonDaisy,
    /// OpenBCI Ganglion, 4 channels at 200 Hz over BLE.
    Ganglion,
    /// The built-in generator, 4 channels at 250 Hz.
    Synthetic,
}

impl BoardProfile {
    /// Human-readable board name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cyton => "Cyton",
            Self::CytonDaisy => "Cyton + Daisy",
            Self::Ganglion => "Ganglion",
            Self::Synthetic => "Synthetic",
        }
    }

    /// Channels the board streams.
    pub fn channel_count(&self) -> usize {
        match self {
            Self::Cyton => 8,
            Self::CytonDaisy => 16,
            Self::Ganglion | Self::Synthetic => 4,
        }
    }

    /// Samples per second per channel.
    pub fn sampling_rate(&self) -> usize {
        match self {
            Self::Cyton | Self::Synthetic => 250,
            Self::CytonDaisy => 125,
            Self::Ganglion => 200,
        }
    }

    /// False for the synthetic generator.
    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Synthetic)
    }
}

impl fmt::Display for BoardProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How to reach a hardware board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// A serial device such as `/dev/ttyUSB0` or `COM3`.
    Serial(PathBuf),
    /// A wireless (BLE) address such as `XX:XX:XX:XX:XX:XX`.
    Wireless(String),
    /// No link; only valid for the synthetic profile.
    None,
}

/// Connection parameters handed to [`SignalSource::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Which board to expect.
    pub profile: BoardProfile,
    /// Serial device of the dongle, for serial boards.
    pub serial_port: Option<PathBuf>,
    /// Wireless address, for BLE boards.
    pub mac_address: Option<String>,
}

impl SourceConfig {
    /// A config for the synthetic generator.
    pub fn synthetic() -> Self {
        Self {
            profile: BoardProfile::Synthetic,
            serial_port: None,
            mac_address: None,
        }
    }

    /// Checks the config before any handshake is attempted and picks the link
    /// to use. A hardware profile needs a serial port or a wireless address;
    /// when both are given the serial port wins.
    pub fn validate(&self) -> Result<Link, SourceError> {
        let serial = self.serial_port.as_ref().filter(|p| !p.as_os_str().is_empty());
        let mac = self.mac_address.as_ref().filter(|m| !m.trim().is_empty());

        if !self.profile.is_hardware() {
            return Ok(Link::None);
        }

        match (serial, mac) {
            (Some(port), Some(_)) => {
                warn!("Both serial port and wireless address provided, using serial port.");
                Ok(Link::Serial(port.clone()))
            }
            (Some(port), None) => Ok(Link::Serial(port.clone())),
            (None, Some(mac)) => Ok(Link::Wireless(mac.trim().to_owned())),
            (None, None) => Err(SourceError::MissingLink(self.profile)),
        }
    }
}

/// Everything that can go wrong while acquiring samples. All of these are
/// fatal to the acquisition process; nothing retries.
#[derive(Debug)]
pub enum SourceError {
    /// A hardware profile was selected without a serial port or address.
    MissingLink(BoardProfile),

    /// The config names a profile this source cannot drive.
    WrongProfile {
        /// What the source can drive.
        expected: &'static str,
        /// What it was asked to drive.
        got: BoardProfile,
    },

    /// The link type exists but this build cannot drive it.
    Unsupported(String),

    /// The board never answered the handshake.
    HandshakeTimeout,

    /// `start` or `get_block` before a successful `connect`.
    NotConnected,

    /// Returned when serial io fails.
    IoError(std::io::Error),
}

impl SourceError {
    /// Likely causes, for the message printed before the process exits.
    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            Self::MissingLink(_) => &["pass --serial-port or --mac-address"],
            Self::WrongProfile { .. } => &["check --board matches the connected device"],
            Self::Unsupported(_) => &["use a Cyton or Cyton + Daisy board over its USB dongle"],
            Self::HandshakeTimeout | Self::IoError(_) => &[
                "the board is switched off or out of range",
                "the serial port or address is wrong",
                "the board profile does not match the device",
                "the USB dongle driver is missing",
            ],
            Self::NotConnected => &["connect before starting the stream"],
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SourceError as SE;
        let msg = match self {
            SE::MissingLink(profile) => Cow::from(format!(
                "{} needs either a serial port or a wireless address",
                profile
            )),
            SE::WrongProfile { expected, got } => {
                Cow::from(format!("this source drives {}, not {}", expected, got))
            }
            SE::Unsupported(what) => Cow::from(format!("unsupported: {}", what)),
            SE::HandshakeTimeout => Cow::from("board did not answer the handshake"),
            SE::NotConnected => Cow::from("source is not connected"),
            SE::IoError(error) => Cow::from(format!("io error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// A device, real or fake, that produces [`SampleBlock`]s at a fixed rate.
pub trait SignalSource {
    /// Validates `config` and performs the handshake. Blocking, bounded by the
    /// underlying device.
    fn connect(&mut self, config: &SourceConfig) -> Result<(), SourceError>;

    /// Begins streaming.
    fn start(&mut self) -> Result<(), SourceError>;

    /// Up to `max_samples` of the newest samples per channel, or `None` when
    /// not streaming or nothing new has arrived.
    fn get_block(&mut self, max_samples: usize) -> Option<SampleBlock>;

    /// Stops streaming. Safe to call when not streaming.
    fn stop(&mut self);

    /// Releases the device. Safe to call more than once.
    fn disconnect(&mut self);

    /// Samples per second per channel.
    fn sampling_rate(&self) -> usize;

    /// Number of EEG channels streamed.
    fn channel_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_columns_follow_timesteps() {
        let block = SampleBlock::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.sample_count(), 3);
        let cols: Vec<_> = block.columns().collect();
        assert_eq!(cols, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
        assert_eq!(SampleBlock::from_columns(&cols), block);
    }

    #[test]
    fn ragged_rows_are_truncated() {
        let block = SampleBlock::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(block.sample_count(), 1);
        assert_eq!(block.channel(0), Some(&[1.0][..]));
    }

    #[test]
    fn keep_last_drops_oldest() {
        let mut block = SampleBlock::from_channels(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        block.keep_last(2);
        assert_eq!(block.channel(0), Some(&[3.0, 4.0][..]));
        block.keep_last(10);
        assert_eq!(block.sample_count(), 2);
    }

    #[test]
    fn empty_block() {
        let block = SampleBlock::default();
        assert!(block.is_empty());
        assert_eq!(block.columns().count(), 0);
    }

    #[test]
    fn hardware_needs_a_link() {
        let config = SourceConfig {
            profile: BoardProfile::Cyton,
            serial_port: None,
            mac_address: Some("  ".to_owned()),
        };
        assert!(matches!(
            config.validate(),
            Err(SourceError::MissingLink(BoardProfile::Cyton))
        ));
    }

    #[test]
    fn serial_wins_over_wireless() {
        let config = SourceConfig {
            profile: BoardProfile::Ganglion,
            serial_port: Some(PathBuf::from("/dev/ttyUSB0")),
            mac_address: Some("AA:BB:CC:DD:EE:FF".to_owned()),
        };
        assert_eq!(
            config.validate().unwrap(),
            Link::Serial(PathBuf::from("/dev/ttyUSB0"))
        );
    }

    #[test]
    fn synthetic_needs_nothing() {
        assert_eq!(SourceConfig::synthetic().validate().unwrap(), Link::None);
    }

    #[test]
    fn profiles_match_hardware() {
        assert_eq!(BoardProfile::Cyton.channel_count(), 8);
        assert_eq!(BoardProfile::Ganglion.sampling_rate(), 200);
        assert_eq!(BoardProfile::CytonDaisy.channel_count(), 16);
        assert!(!BoardProfile::Synthetic.is_hardware());
    }
}
