//! The real-hardware [`SignalSource`]: an OpenBCI Cyton (optionally with the
//! Daisy module) on its USB serial dongle.
//!
//! A background thread reads the port, decodes packets with
//! [`PacketStream`], and pushes one column per sample into a shared buffer.
//! [`SignalSource::get_block`] drains that buffer.

use crate::packet_decoder::{CytonPacket, PacketStream};
use crate::signal_source::*;

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    collections::VecDeque,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

const BAUD_RATE: u32 = 115200;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(100);
// Seconds of samples kept if nobody drains the buffer.
const BUFFERED_SECONDS: usize = 10;

/// Cyton command bytes.
mod cmd {
    pub const SOFT_RESET: &[u8] = b"v";
    pub const START_STREAM: &[u8] = b"b";
    pub const STOP_STREAM: &[u8] = b"s";
}

type ColumnBuffer = Arc<Mutex<VecDeque<Vec<Sample>>>>;

/// A Cyton board (with or without Daisy) on a serial dongle.
///
/// A reader thread decodes packets into a bounded column buffer that
/// [`SignalSource::get_data`] drains.
pub struct CytonSource {
    profile: BoardProfile,
    port: Option<Arc<SerialPort>>,
    columns: ColumnBuffer,
    running: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl CytonSource {
    /// Instantiates a disconnected source.
    pub fn new() -> Self {
        Self {
            profile: BoardProfile::Cyton,
            port: None,
            columns: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Serial devices present on this machine.
    pub fn available_ports() -> io::Result<Vec<PathBuf>> {
        SerialPort::available_ports()
    }

    fn open(path: &Path) -> Result<SerialPort, SourceError> {
        info!("Connecting via serial port: {}", path.display());
        let mut port = SerialPort::open(path, BAUD_RATE)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        Ok(port)
    }

    // Soft reset, then wait for the "$$$" that ends the board's banner.
    fn handshake(port: &SerialPort) -> Result<(), SourceError> {
        port.write_all(cmd::SOFT_RESET)?;
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut banner = Vec::new();
        let mut buffer = [0u8; 256];

        while Instant::now() < deadline {
            match port.read(&mut buffer) {
                Ok(n) => {
                    banner.extend_from_slice(&buffer[..n]);
                    if banner.windows(3).any(|w| w == b"$$$") {
                        debug!("Board banner: {}", String::from_utf8_lossy(&banner).trim());
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SourceError::HandshakeTimeout)
    }

    fn spawn_reader(&mut self, port: Arc<SerialPort>) {
        let columns = Arc::clone(&self.columns);
        let running = Arc::clone(&self.running);
        let daisy = self.profile == BoardProfile::CytonDaisy;
        let capacity = self.profile.sampling_rate() * BUFFERED_SECONDS;

        self.running.store(true, Ordering::SeqCst);
        self.reader = Some(thread::spawn(move || {
            let mut stream = PacketStream::new();
            let mut merger = DaisyMerger::default();
            let mut buffer = [0u8; 512];

            while running.load(Ordering::SeqCst) {
                let read_len = match port.read(&mut buffer) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                    Err(e) => {
                        warn!("Serial read failed, reader stopping: {}", e);
                        break;
                    }
                };

                let new_columns: Vec<Vec<Sample>> = stream
                    .push(&buffer[..read_len])
                    .into_iter()
                    .filter_map(|packet| {
                        if daisy {
                            merger.push(packet)
                        } else {
                            Some(packet.channels)
                        }
                    })
                    .collect();

                let mut shared = columns.lock().unwrap_or_else(PoisonError::into_inner);
                for column in new_columns {
                    if shared.len() == capacity {
                        shared.pop_front();
                    }
                    shared.push_back(column);
                }
            }
            debug!("Serial reader terminated after skipping {} bytes.", stream.skipped());
        }));
    }

    fn join_reader(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Serial reader thread panicked.");
            }
        }
    }
}

impl Default for CytonSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for CytonSource {
    fn connect(&mut self, config: &SourceConfig) -> Result<(), SourceError> {
        let path = match config.validate()? {
            Link::Serial(path) => path,
            Link::Wireless(address) => {
                return Err(SourceError::Unsupported(format!(
                    "wireless connection to {} (only the USB serial dongle is supported)",
                    address
                )))
            }
            Link::None => {
                return Err(SourceError::WrongProfile {
                    expected: "Cyton or Cyton + Daisy",
                    got: config.profile,
                })
            }
        };
        if !matches!(config.profile, BoardProfile::Cyton | BoardProfile::CytonDaisy) {
            return Err(SourceError::WrongProfile {
                expected: "Cyton or Cyton + Daisy",
                got: config.profile,
            });
        }

        // Drop whatever was connected before.
        self.disconnect();

        info!("Attempting to connect to {}", config.profile);
        let port = Self::open(&path)?;
        Self::handshake(&port)?;

        self.profile = config.profile;
        self.port = Some(Arc::new(port));
        info!(
            "Connected to {}: {} channels at {} Hz",
            self.profile,
            self.profile.channel_count(),
            self.profile.sampling_rate()
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        let port = self.port.clone().ok_or(SourceError::NotConnected)?;
        if self.reader.is_some() {
            return Ok(());
        }
        port.write_all(cmd::START_STREAM)?;
        self.spawn_reader(port);
        Ok(())
    }

    fn get_block(&mut self, max_samples: usize) -> Option<SampleBlock> {
        self.reader.as_ref()?;
        let columns: Vec<Vec<Sample>> = {
            let mut shared = self.columns.lock().unwrap_or_else(PoisonError::into_inner);
            shared.drain(..).collect()
        };
        if columns.is_empty() {
            return None;
        }
        let mut block = SampleBlock::from_columns(&columns);
        block.keep_last(max_samples);
        Some(block)
    }

    fn stop(&mut self) {
        if self.reader.is_none() {
            return;
        }
        self.join_reader();
        if let Some(port) = &self.port {
            if let Err(e) = port.write_all(cmd::STOP_STREAM) {
                warn!("Failed to stop stream: {}", e);
            }
        }
    }

    fn disconnect(&mut self) {
        self.stop();
        if self.port.take().is_some() {
            info!("Released {}", self.profile);
        }
        self.columns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn sampling_rate(&self) -> usize {
        self.profile.sampling_rate()
    }

    fn channel_count(&self) -> usize {
        self.profile.channel_count()
    }
}

impl Drop for CytonSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Pairs a main-board packet (odd sample number) with the Daisy packet that
/// follows it, producing one 16-channel column.
#[derive(Debug, Default)]
pub struct DaisyMerger {
    board: Option<CytonPacket>,
}

impl DaisyMerger {
    /// Feeds one packet; returns a full column once a pair is complete.
    pub fn push(&mut self, packet: CytonPacket) -> Option<Vec<Sample>> {
        if !packet.is_daisy() {
            self.board = Some(packet);
            return None;
        }
        // A Daisy packet without its main-board half is dropped.
        let board = self.board.take()?;
        let mut column = board.channels;
        column.extend(packet.channels);
        Some(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sample_number: u8, value: f64) -> CytonPacket {
        CytonPacket {
            sample_number,
            channels: vec![value; 8],
            aux: [0; 6],
            footer: 0xC0,
        }
    }

    #[test]
    fn daisy_pairs_odd_then_even() {
        let mut merger = DaisyMerger::default();
        assert!(merger.push(packet(2, 9.0)).is_none());
        assert!(merger.push(packet(1, 1.0)).is_none());
        let column = merger.push(packet(2, 2.0)).unwrap();
        assert_eq!(column.len(), 16);
        assert_eq!(column[0], 1.0);
        assert_eq!(column[15], 2.0);
        assert!(merger.push(packet(4, 2.0)).is_none());
    }

    #[test]
    fn wireless_is_rejected_before_touching_hardware() {
        let mut src = CytonSource::new();
        let config = SourceConfig {
            profile: BoardProfile::Cyton,
            serial_port: None,
            mac_address: Some("AA:BB:CC:DD:EE:FF".to_owned()),
        };
        assert!(matches!(src.connect(&config), Err(SourceError::Unsupported(_))));
    }

    #[test]
    fn synthetic_profile_is_wrong_here() {
        let mut src = CytonSource::new();
        assert!(matches!(
            src.connect(&SourceConfig::synthetic()),
            Err(SourceError::WrongProfile { .. })
        ));
    }

    #[test]
    fn ganglion_over_serial_is_wrong_profile() {
        let mut src = CytonSource::new();
        let config = SourceConfig {
            profile: BoardProfile::Ganglion,
            serial_port: Some(PathBuf::from("/dev/does-not-exist")),
            mac_address: None,
        };
        assert!(matches!(
            src.connect(&config),
            Err(SourceError::WrongProfile { .. })
        ));
    }

    #[test]
    fn nothing_before_connect() {
        let mut src = CytonSource::new();
        assert!(matches!(src.start(), Err(SourceError::NotConnected)));
        assert!(src.get_block(250).is_none());
        src.stop();
        src.disconnect();
    }

    #[test]
    fn missing_device_is_an_io_error() {
        let mut src = CytonSource::new();
        let config = SourceConfig {
            profile: BoardProfile::Cyton,
            serial_port: Some(PathBuf::from("/dev/focusrace-no-such-port")),
            mac_address: None,
        };
        assert!(matches!(src.connect(&config), Err(SourceError::IoError(_))));
    }
}
