//! VDIF frame header decoding and encoding.
//!
//! Reference: [VDIF Specification](https://vlbi.org/vlbi-standards/vdif/), release 1.1.1
//!
//! All header words are little-endian 32-bit words. Bit numbers below are LSB first.
//!
//! | Word | Bits  | Field |
//! |------|-------|-------|
//! | 0    | 0-29  | seconds since epoch |
//! | 0    | 30    | legacy mode |
//! | 0    | 31    | invalid |
//! | 1    | 0-23  | frame number within second |
//! | 1    | 24-29 | reference epoch (half years since 2000) |
//! | 2    | 0-23  | frame length in units of 8 bytes, including header |
//! | 2    | 24-28 | log2 of the number of channels |
//! | 2    | 29-31 | VDIF version |
//! | 3    | 0-15  | station id |
//! | 3    | 16-25 | thread id |
//! | 3    | 26-30 | bits per sample minus 1 |
//! | 3    | 31    | complex data |
//! | 4    | 24-31 | extended data version (EDV) |
//!
//! Words 4 (bits 0-23) through 7 are extended user data. See [ExtendedData].
mod edv;
mod time;

pub use edv::*;
pub use time::{mjd_from_ymd, ymd_from_mjd};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fill pattern word, as read from little-endian bytes `44 33 22 11`.
///
/// Recorders write it over the start and end of frames that were never received.
pub const FILL_PATTERN: u32 = 0x1122_3344;

/// Largest thread id that fits in the 10-bit thread id field.
pub const MAX_THREAD_ID: u16 = 1023;

/// Frames per second value that cannot be represented by the 24-bit frame number.
pub const FRAMES_PER_SECOND_SENTINEL: u32 = 1 << 24;

const SECONDS_MASK: u32 = 0x3fff_ffff;
const FRAME_MASK: u32 = 0xff_ffff;
const FRAME_LENGTH8_MASK: u32 = 0xff_ffff;

/// Read the `idx`th little-endian word from `buf`.
///
/// # Panics
/// If `buf` does not contain the word.
#[inline]
pub(crate) fn word(buf: &[u8], idx: usize) -> u32 {
    let x = idx * 4;
    u32::from_le_bytes([buf[x], buf[x + 1], buf[x + 2], buf[x + 3]])
}

/// Decoded VDIF frame header.
///
/// Field values are not range checked on decode. Decoding followed by encoding reproduces
/// the original bytes for every field the codec understands; unassigned bits are written
/// as zero.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub invalid: bool,
    /// Legacy headers are only 16 bytes and carry no extended data.
    pub legacy: bool,
    /// Seconds since the reference epoch (30 bits).
    pub seconds: u32,
    /// Reference epoch in half years since 2000-01-01 (6 bits).
    pub epoch: u8,
    /// Frame number within the second (24 bits).
    pub frame: u32,
    pub version: u8,
    /// log2 of the number of channels (5 bits).
    pub log2_channels: u8,
    /// Frame length in bytes, including the header. Always a multiple of 8.
    pub frame_length: u32,
    pub complex: bool,
    pub bits_per_sample_minus1: u8,
    /// Thread id (10 bits).
    pub thread_id: u16,
    pub station_id: u16,
    /// Extended data version, selecting the interpretation of [Header::extended].
    pub edv: u8,
    /// Raw extended user data. Only the lower 24 bits of the first word are used.
    pub extended: [u32; 4],
}

impl Header {
    /// Length of a standard header.
    pub const LEN: usize = 32;
    /// Length of a legacy header.
    pub const LEGACY_LEN: usize = 16;

    /// Create a new header for frames with `payload_len` data bytes.
    ///
    /// Time fields, epoch, and extended data are all zero.
    ///
    /// # Errors
    /// [Error::InvalidParameter] listing every violated constraint: `bits_per_sample` must be
    /// 1 to 32, `payload_len` a multiple of 8, `thread_id` at most [MAX_THREAD_ID], and
    /// `channels` a power of 2.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        payload_len: usize,
        thread_id: u32,
        bits_per_sample: u32,
        channels: u64,
        complex: bool,
        station: [u8; 2],
    ) -> Result<Self> {
        let mut problems = Vec::new();
        if !(1..=32).contains(&bits_per_sample) {
            problems.push(format!("bits per sample must be 1 to 32; got {bits_per_sample}"));
        }
        let frame_length = payload_len.saturating_add(Self::LEN);
        if payload_len % 8 != 0 {
            problems.push(format!("payload length must be a multiple of 8; got {payload_len}"));
        } else if frame_length / 8 > FRAME_LENGTH8_MASK as usize {
            problems.push(format!("frame length {frame_length} is too large"));
        }
        if thread_id > u32::from(MAX_THREAD_ID) {
            problems.push(format!(
                "thread id must be 0 to {MAX_THREAD_ID}; got {thread_id}"
            ));
        }
        let log2_channels = match log2_channels(channels) {
            Ok(x) => x,
            Err(err) => {
                problems.push(err.to_string());
                0
            }
        };
        if !problems.is_empty() {
            return Err(Error::InvalidParameter(problems.join("; ")));
        }

        Ok(Header {
            log2_channels,
            frame_length: frame_length as u32,
            complex,
            bits_per_sample_minus1: (bits_per_sample - 1) as u8,
            thread_id: thread_id as u16,
            station_id: u16::from_be_bytes(station),
            ..Default::default()
        })
    }

    /// Decode a header from the start of `buf`.
    ///
    /// Legacy headers need only [Header::LEGACY_LEN] bytes, all others [Header::LEN].
    ///
    /// # Errors
    /// [Error::MalformedHeader] if there are not enough bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEGACY_LEN {
            return Err(Error::MalformedHeader {
                actual: buf.len(),
                minimum: Self::LEGACY_LEN,
            });
        }
        let w0 = word(buf, 0);
        let w1 = word(buf, 1);
        let w2 = word(buf, 2);
        let w3 = word(buf, 3);

        let legacy = (w0 >> 30) & 0x1 == 1;
        let (edv, extended) = if legacy {
            (0, [0; 4])
        } else {
            if buf.len() < Self::LEN {
                return Err(Error::MalformedHeader {
                    actual: buf.len(),
                    minimum: Self::LEN,
                });
            }
            let w4 = word(buf, 4);
            (
                (w4 >> 24) as u8,
                [w4 & 0xff_ffff, word(buf, 5), word(buf, 6), word(buf, 7)],
            )
        };

        Ok(Header {
            invalid: (w0 >> 31) & 0x1 == 1,
            legacy,
            seconds: w0 & SECONDS_MASK,
            epoch: ((w1 >> 24) & 0x3f) as u8,
            frame: w1 & FRAME_MASK,
            version: ((w2 >> 29) & 0x7) as u8,
            log2_channels: ((w2 >> 24) & 0x1f) as u8,
            frame_length: (w2 & FRAME_LENGTH8_MASK) * 8,
            complex: (w3 >> 31) & 0x1 == 1,
            bits_per_sample_minus1: ((w3 >> 26) & 0x1f) as u8,
            thread_id: ((w3 >> 16) & 0x3ff) as u16,
            station_id: (w3 & 0xffff) as u16,
            edv,
            extended,
        })
    }

    fn words(&self) -> [u32; 8] {
        [
            u32::from(self.invalid) << 31
                | u32::from(self.legacy) << 30
                | (self.seconds & SECONDS_MASK),
            u32::from(self.epoch & 0x3f) << 24 | (self.frame & FRAME_MASK),
            u32::from(self.version & 0x7) << 29
                | u32::from(self.log2_channels & 0x1f) << 24
                | ((self.frame_length / 8) & FRAME_LENGTH8_MASK),
            u32::from(self.complex) << 31
                | u32::from(self.bits_per_sample_minus1 & 0x1f) << 26
                | u32::from(self.thread_id & 0x3ff) << 16
                | u32::from(self.station_id),
            u32::from(self.edv) << 24 | (self.extended[0] & 0xff_ffff),
            self.extended[1],
            self.extended[2],
            self.extended[3],
        ]
    }

    /// Encode into the start of `buf`, returning the number of bytes written.
    ///
    /// # Errors
    /// [Error::MalformedHeader] if `buf` is too short for this header.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.header_len();
        if buf.len() < len {
            return Err(Error::MalformedHeader {
                actual: buf.len(),
                minimum: len,
            });
        }
        for (dst, w) in buf[..len].chunks_exact_mut(4).zip(self.words()) {
            dst.copy_from_slice(&w.to_le_bytes());
        }
        Ok(len)
    }

    /// Encode to a new buffer of [Header::header_len] bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.words()
            .iter()
            .take(self.header_len() / 4)
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    /// Number of bytes this header occupies in a frame.
    #[must_use]
    pub fn header_len(&self) -> usize {
        if self.legacy {
            Self::LEGACY_LEN
        } else {
            Self::LEN
        }
    }

    #[must_use]
    pub fn bits_per_sample(&self) -> u32 {
        u32::from(self.bits_per_sample_minus1) + 1
    }

    #[must_use]
    pub fn num_channels(&self) -> u32 {
        1 << (self.log2_channels & 0x1f)
    }

    /// Set the channel count.
    ///
    /// # Errors
    /// [Error::InvalidChannelCount] if `channels` is not a power of 2.
    pub fn set_num_channels(&mut self, channels: u64) -> Result<()> {
        self.log2_channels = log2_channels(channels)?;
        Ok(())
    }

    /// Total frame size in bytes, header included.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.frame_length as usize
    }

    /// Number of data bytes following the header.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        (self.frame_length as usize).saturating_sub(self.header_len())
    }

    /// Two character station code, if the station id looks like one.
    #[must_use]
    pub fn station_code(&self) -> Option<String> {
        let [a, b] = self.station_id.to_be_bytes();
        let printable = |c: u8| (b' '..0x7f).contains(&c);
        if !printable(a) {
            return None;
        }
        if b == 0 {
            return Some(char::from(a).to_string());
        }
        if !printable(b) {
            return None;
        }
        Some([char::from(a), char::from(b)].iter().collect())
    }

    /// Interpret the extended user data according to [Header::edv].
    #[must_use]
    pub fn extended_data(&self) -> ExtendedData {
        ExtendedData::decode(self)
    }
}

/// Convert a channel count to its log2 representation.
///
/// # Errors
/// [Error::InvalidChannelCount] if `channels` is not a power of 2 or is larger than 2^31.
#[allow(clippy::cast_possible_truncation)]
pub fn log2_channels(channels: u64) -> Result<u8> {
    if !channels.is_power_of_two() || channels > 1 << 31 {
        return Err(Error::InvalidChannelCount(channels));
    }
    Ok(channels.trailing_zeros() as u8)
}

/// Convert log2 channels back to a channel count.
#[must_use]
pub fn channels_from_log2(log2: u8) -> u64 {
    1 << (log2 & 0x1f)
}
