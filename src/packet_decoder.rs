//! Parses the binary packets an OpenBCI Cyton streams over its serial dongle.
//!
//! Every packet is 33 bytes:
//!
//! ```text
//! 0xA0 | sample no. | 8 x 24-bit signed BE channel counts | 6 aux bytes | 0xC0..=0xC6
//! ```
//!
//! Serial streams start mid-packet and occasionally drop bytes, so
//! [`PacketStream`] resynchronises on the header byte and skips anything that
//! does not parse.

use nom::{
    bytes::complete::{tag, take},
    combinator::{map, verify},
    multi::count,
    number::complete::{be_i24, u8},
    sequence::tuple,
    Finish, IResult,
};

/// Bytes in one Cyton packet.
pub const PACKET_LEN: usize = 33;
/// First byte of every packet.
pub const HEADER: u8 = 0xA0;
/// Channels carried per packet.
pub const CHANNELS_PER_PACKET: usize = 8;

/// ADS1299 full scale: 4.5 V reference, gain 24, 24-bit counts, in microvolts.
pub const MICROVOLTS_PER_COUNT: f64 = 4.5 / 24.0 / 8_388_607.0 * 1_000_000.0;

/// One decoded 33-byte Cyton packet.
#[derive(Debug, Clone, PartialEq)]
pub struct CytonPacket {
    /// Rolling counter; odd on the main board, even on the Daisy.
    pub sample_number: u8,
    /// Channel values in microvolts.
    pub channels: Vec<f64>,
    /// Accelerometer or other aux bytes, undecoded.
    pub aux: [u8; 6],
    /// Stop byte, `0xC0` to `0xC6`.
    pub footer: u8,
}

impl CytonPacket {
    /// Odd sample numbers come from the main board, even ones from the Daisy.
    pub fn is_daisy(&self) -> bool {
        self.sample_number % 2 == 0
    }
}

fn parse_channels(s: &[u8]) -> IResult<&[u8], Vec<f64>> {
    count(
        map(be_i24, |counts| counts as f64 * MICROVOLTS_PER_COUNT),
        CHANNELS_PER_PACKET,
    )(s)
}

fn parse_aux(s: &[u8]) -> IResult<&[u8], [u8; 6]> {
    map(take(6usize), |bs: &[u8]| {
        let mut aux = [0u8; 6];
        aux.copy_from_slice(bs);
        aux
    })(s)
}

fn parse_footer(s: &[u8]) -> IResult<&[u8], u8> {
    verify(u8, |b: &u8| (0xC0..=0xC6).contains(b))(s)
}

/// Parses a single packet at the start of `s`.
pub fn parse_packet(s: &[u8]) -> IResult<&[u8], CytonPacket> {
    map(
        tuple((tag(&[HEADER][..]), u8, parse_channels, parse_aux, parse_footer)),
        |(_header, sample_number, channels, aux, footer)| CytonPacket {
            sample_number,
            channels,
            aux,
            footer,
        },
    )(s)
}

/// Accumulates raw serial bytes and hands back whole packets.
#[derive(Debug, Default)]
pub struct PacketStream {
    pending: Vec<u8>,
    skipped: usize,
}

impl PacketStream {
    /// An empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes thrown away while resynchronising.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feeds `bytes` in and returns every packet that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<CytonPacket> {
        self.pending.extend_from_slice(bytes);
        let mut packets = Vec::new();

        loop {
            match self.pending.iter().position(|&b| b == HEADER) {
                Some(0) => {}
                Some(idx) => {
                    self.skipped += idx;
                    self.pending.drain(..idx);
                }
                None => {
                    self.skipped += self.pending.len();
                    self.pending.clear();
                    break;
                }
            }

            if self.pending.len() < PACKET_LEN {
                break;
            }

            match parse_packet(&self.pending[..PACKET_LEN]).finish() {
                Ok((_rest, packet)) => {
                    packets.push(packet);
                    self.pending.drain(..PACKET_LEN);
                }
                Err(_) => {
                    // A header byte that was really payload; move past it.
                    self.skipped += 1;
                    self.pending.drain(..1);
                }
            }
        }

        packets
    }
}
