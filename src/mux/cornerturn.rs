//! Bit-level transposes that interleave per-channel sample streams.
//!
//! Given `n` channel buffers of `L` bytes each, the output is `n * L` bytes where sample `t`
//! of channel `c` lands at bit `(t * n + c) * bits_per_sample`, counting from the least
//! significant bit of the first byte.
//!
//! The 2-bit kernels assemble a 32-bit word from one or two bytes of each channel and move
//! samples into place with a fixed set of masks and shifts. For 4 channels this is a 4x4
//! transpose of 2-bit samples:
//!
//! ```text
//! Channel: ------3-------   ------2-------   ------1-------   ------0-------
//! Input:   d3  d2  d1  d0   c3  c2  c1  c0   b3  b2  b1  b0   a3  a2  a1  a0
//! Shift:    0  -3  -6  -9   +3   0  -3  -6   +6  +3   0  -3   +9  +6  +3   0
//! Output:  d3  c3  b3  a3   d2  c2  b2  a2   d1  c1  b1  a1   d0  c0  b0  a0
//! Byte:    ------3-------   ------2-------   ------1-------   ------0-------
//! ```
//!
//! 8 and 16 channels run two or four 4-channel transposes and then shuffle bytes.
use rayon::prelude::*;

use crate::{Error, Result};

/// Minimum number of output chunks handed to a rayon task.
const MIN_CHUNKS_PER_TASK: usize = 1 << 12;

/// Corner-turn implementation for one output shape.
///
/// Chosen once per demultiplexer rather than per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Single channel of any sample size; a plain copy.
    Copy,
    TwoChannel2Bit,
    FourChannel2Bit,
    EightChannel2Bit,
    SixteenChannel2Bit,
}

impl Kernel {
    /// Select the kernel for `channels` output channels of `bits_per_sample` bit samples.
    ///
    /// # Errors
    /// [Error::UnsupportedShape] if there is no kernel for the shape.
    pub fn select(channels: usize, bits_per_sample: u32) -> Result<Self> {
        match (channels, bits_per_sample) {
            (1, _) => Ok(Kernel::Copy),
            (2, 2) => Ok(Kernel::TwoChannel2Bit),
            (4, 2) => Ok(Kernel::FourChannel2Bit),
            (8, 2) => Ok(Kernel::EightChannel2Bit),
            (16, 2) => Ok(Kernel::SixteenChannel2Bit),
            _ => Err(Error::UnsupportedShape {
                channels,
                bits_per_sample,
            }),
        }
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        match self {
            Kernel::Copy => 1,
            Kernel::TwoChannel2Bit => 2,
            Kernel::FourChannel2Bit => 4,
            Kernel::EightChannel2Bit => 8,
            Kernel::SixteenChannel2Bit => 16,
        }
    }

    /// Interleave `inputs` into `out`.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if the number of inputs does not match the kernel, the
    /// inputs differ in length, their length is not a multiple of 4, or `out` is not exactly
    /// as long as all inputs together.
    pub fn apply(&self, out: &mut [u8], inputs: &[&[u8]]) -> Result<()> {
        let len = check_shape(out, inputs, self.channels())?;
        if *self != Kernel::Copy && len % 4 != 0 {
            return Err(Error::InvalidParameter(format!(
                "channel length must be a multiple of 4; got {len}"
            )));
        }
        match self {
            Kernel::Copy => out.copy_from_slice(inputs[0]),
            Kernel::TwoChannel2Bit => two_channel(out, inputs[0], inputs[1]),
            Kernel::FourChannel2Bit => four_channel(out, inputs),
            Kernel::EightChannel2Bit => wide(out, inputs, 2),
            Kernel::SixteenChannel2Bit => wide(out, inputs, 4),
        }
        Ok(())
    }
}

fn check_shape(out: &[u8], inputs: &[&[u8]], channels: usize) -> Result<usize> {
    if inputs.len() != channels {
        return Err(Error::InvalidParameter(format!(
            "expected {channels} channel buffers; got {}",
            inputs.len()
        )));
    }
    let len = inputs[0].len();
    if inputs.iter().any(|x| x.len() != len) {
        return Err(Error::InvalidParameter(
            "channel buffers differ in length".to_string(),
        ));
    }
    if out.len() != len * channels {
        return Err(Error::InvalidParameter(format!(
            "output must be {} bytes; got {}",
            len * channels,
            out.len()
        )));
    }
    Ok(len)
}

#[inline]
fn turn2(x: u32) -> u32 {
    const M0: u32 = 0xc003_c003;
    const M1: u32 = 0x3000_3000;
    const M2: u32 = 0x000c_000c;
    const M3: u32 = 0x0c00_0c00;
    const M4: u32 = 0x0030_0030;
    const M5: u32 = 0x0300_0300;
    const M6: u32 = 0x00c0_00c0;
    (x & M0)
        | ((x & M1) >> 2)
        | ((x & M2) << 2)
        | ((x & M3) >> 4)
        | ((x & M4) << 4)
        | ((x & M5) >> 6)
        | ((x & M6) << 6)
}

#[inline]
fn turn4(x: u32) -> u32 {
    const M0: u32 = 0xc030_0c03;
    const M1: u32 = 0x300c_0300;
    const M2: u32 = 0x00c0_300c;
    const M3: u32 = 0x0c03_0000;
    const M4: u32 = 0x0000_c030;
    const M5: u32 = 0x0300_0000;
    const M6: u32 = 0x0000_00c0;
    (x & M0)
        | ((x & M1) >> 6)
        | ((x & M2) << 6)
        | ((x & M3) >> 12)
        | ((x & M4) << 12)
        | ((x & M5) >> 18)
        | ((x & M6) << 18)
}

fn two_channel(out: &mut [u8], a: &[u8], b: &[u8]) {
    out.par_chunks_exact_mut(4)
        .with_min_len(MIN_CHUNKS_PER_TASK)
        .enumerate()
        .for_each(|(i, dst)| {
            let x = u32::from_le_bytes([a[2 * i], b[2 * i], a[2 * i + 1], b[2 * i + 1]]);
            dst.copy_from_slice(&turn2(x).to_le_bytes());
        });
}

fn four_channel(out: &mut [u8], inputs: &[&[u8]]) {
    out.par_chunks_exact_mut(4)
        .with_min_len(MIN_CHUNKS_PER_TASK)
        .enumerate()
        .for_each(|(i, dst)| {
            let x = u32::from_le_bytes([inputs[0][i], inputs[1][i], inputs[2][i], inputs[3][i]]);
            dst.copy_from_slice(&turn4(x).to_le_bytes());
        });
}

/// 8 or 16 channels: `groups` 4-channel transposes, then byte `k` of group `j` goes to
/// output byte `k * groups + j`.
fn wide(out: &mut [u8], inputs: &[&[u8]], groups: usize) {
    out.par_chunks_exact_mut(4 * groups)
        .with_min_len(MIN_CHUNKS_PER_TASK / groups)
        .enumerate()
        .for_each(|(i, dst)| {
            for (j, group) in inputs.chunks_exact(4).enumerate() {
                let x = u32::from_le_bytes([group[0][i], group[1][i], group[2][i], group[3][i]]);
                for (k, byte) in turn4(x).to_le_bytes().into_iter().enumerate() {
                    dst[k * groups + j] = byte;
                }
            }
        });
}

/// Reference transpose for any channel count and 1, 2, 4, or 8 bit samples.
///
/// Sample by sample and single threaded; the [Kernel]s produce identical output.
///
/// # Errors
/// [Error::InvalidParameter] if `bits_per_sample` is unsupported or the buffer lengths do
/// not agree.
pub fn generic(out: &mut [u8], inputs: &[&[u8]], bits_per_sample: u32) -> Result<()> {
    if ![1, 2, 4, 8].contains(&bits_per_sample) {
        return Err(Error::InvalidParameter(format!(
            "bits per sample must be 1, 2, 4, or 8; got {bits_per_sample}"
        )));
    }
    if inputs.is_empty() {
        return Err(Error::InvalidParameter("no channel buffers".to_string()));
    }
    let channels = inputs.len();
    let len = check_shape(out, inputs, channels)?;
    let bits = bits_per_sample as usize;
    let mask = ((1u16 << bits) - 1) as u8;
    let samples = len * 8 / bits;

    out.fill(0);
    for t in 0..samples {
        let (src_byte, src_shift) = (t * bits / 8, t * bits % 8);
        for (c, input) in inputs.iter().enumerate() {
            let sample = (input[src_byte] >> src_shift) & mask;
            let pos = (t * channels + c) * bits;
            out[pos / 8] |= sample << (pos % 8);
        }
    }
    Ok(())
}
