//! Extended data version (EDV) views of a header's extended user data.
//!
//! Each view is decoded on demand from [Header::extended]; nothing is stored.
use serde::{Deserialize, Serialize};

use super::Header;

/// Sync word used by EDV 1, 3, and 4 headers.
pub const EDV_SYNC_WORD: u32 = 0xacab_feed;
/// Magic value in the 20-bit sync field of ALMA (EDV 2) headers.
pub const ALMA_SYNC: u32 = 0xa_5ea5;

/// EDV 1 (NICT) extended data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edv1 {
    /// Sample rate in units of [Edv1::sample_rate_mhz].
    pub sample_rate: u32,
    /// True when `sample_rate` is in MHz, otherwise kHz.
    pub sample_rate_mhz: bool,
    pub sync_word: u32,
    pub name: [u8; 8],
}

impl Edv1 {
    #[must_use]
    pub fn sample_rate_hz(&self) -> u64 {
        sample_rate_hz(self.sample_rate, self.sample_rate_mhz)
    }
}

/// EDV 2 (ALMA) extended data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edv2 {
    pub pol_block: bool,
    pub quadrant_minus1: u8,
    pub correlator: bool,
    /// 20-bit sync field; [ALMA_SYNC] for valid ALMA data.
    pub sync: u32,
    pub status: u32,
    /// Packet sequence number.
    pub psn: u64,
}

/// EDV 3 (VLBA) extended data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edv3 {
    pub sample_rate: u32,
    pub sample_rate_mhz: bool,
    pub sync_word: u32,
    /// Tuning frequency in units of 2^-24 MHz, spanning 0 to 256 MHz.
    pub tuning: u32,
    pub personality_type: u8,
    pub minor_rev: u8,
    pub major_rev: u8,
    /// True for upper sideband.
    pub upper_sideband: bool,
    pub subband: u8,
    pub if_number: u8,
    pub dbe_unit: u8,
}

impl Edv3 {
    #[must_use]
    pub fn sample_rate_hz(&self) -> u64 {
        sample_rate_hz(self.sample_rate, self.sample_rate_mhz)
    }

    #[must_use]
    pub fn tuning_mhz(&self) -> f64 {
        f64::from(self.tuning) / f64::from(1u32 << 24)
    }
}

/// EDV 4 (multi-thread validity) extended data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edv4 {
    /// Number of significant bits in `validity_mask`.
    pub mask_length: u16,
    pub sync_word: u32,
    pub validity_mask: u64,
}

impl Edv4 {
    /// True if the channel at `index` is flagged valid. Indexes beyond `mask_length` are
    /// never valid.
    #[must_use]
    pub fn is_valid(&self, index: usize) -> bool {
        index < usize::from(self.mask_length) && index < 64 && self.validity_mask >> index & 1 == 1
    }
}

/// Interpretation of the extended user data selected by the extended data version.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtendedData {
    /// EDV 0, no extended data. Also used for legacy headers.
    None,
    Nict(Edv1),
    Alma(Edv2),
    Vlba(Edv3),
    Multithread(Edv4),
    /// An EDV this crate does not know how to interpret.
    Unknown { edv: u8, words: [u32; 4] },
}

#[allow(clippy::cast_possible_truncation)]
impl ExtendedData {
    pub(crate) fn decode(hdr: &Header) -> Self {
        if hdr.legacy {
            return ExtendedData::None;
        }
        let [w4, w5, w6, w7] = hdr.extended;
        match hdr.edv {
            0 => ExtendedData::None,
            1 => {
                let mut name = [0u8; 8];
                name[..4].copy_from_slice(&w6.to_le_bytes());
                name[4..].copy_from_slice(&w7.to_le_bytes());
                ExtendedData::Nict(Edv1 {
                    sample_rate: w4 & 0x7f_ffff,
                    sample_rate_mhz: (w4 >> 23) & 1 == 1,
                    sync_word: w5,
                    name,
                })
            }
            2 => ExtendedData::Alma(Edv2 {
                pol_block: w4 & 1 == 1,
                quadrant_minus1: ((w4 >> 1) & 0x3) as u8,
                correlator: (w4 >> 3) & 1 == 1,
                sync: (w4 >> 4) & 0xf_ffff,
                status: w5,
                psn: u64::from(w7) << 32 | u64::from(w6),
            }),
            3 => ExtendedData::Vlba(Edv3 {
                sample_rate: w4 & 0x7f_ffff,
                sample_rate_mhz: (w4 >> 23) & 1 == 1,
                sync_word: w5,
                tuning: w6,
                personality_type: (w7 & 0xff) as u8,
                minor_rev: ((w7 >> 8) & 0xf) as u8,
                major_rev: ((w7 >> 12) & 0xf) as u8,
                upper_sideband: (w7 >> 16) & 1 == 1,
                subband: ((w7 >> 17) & 0x7) as u8,
                if_number: ((w7 >> 20) & 0xf) as u8,
                dbe_unit: ((w7 >> 24) & 0xf) as u8,
            }),
            4 => ExtendedData::Multithread(Edv4 {
                mask_length: (w4 & 0xffff) as u16,
                sync_word: w5,
                validity_mask: u64::from(w7) << 32 | u64::from(w6),
            }),
            edv => ExtendedData::Unknown {
                edv,
                words: hdr.extended,
            },
        }
    }
}

fn sample_rate_hz(rate: u32, mhz: bool) -> u64 {
    u64::from(rate) * if mhz { 1_000_000 } else { 1_000 }
}
