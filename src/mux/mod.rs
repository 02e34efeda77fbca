//! Demultiplexing multi-thread VDIF into single-thread, multi-channel VDIF.
//!
//! Each input thread carries one channel. Frames from all threads covering the same
//! instant are gathered into a slot of a destination window and, once every thread is
//! present, corner-turned into a single output frame whose samples interleave the
//! channels.
//!
//! A call makes two passes over the destination window:
//!
//! 1. Scatter: scan the source, skipping fill, garbage, invalid frames, and unwanted
//!    threads, and copy each payload into the slot for its frame number. Slot 0 is kept
//!    free so pass 2 can work in place.
//! 2. Corner turn: for each slot `f`, write the output frame into slot `f - 1`. Slots
//!    missing a thread produce a frame marked invalid.
//!
//! # Example
//! ```
//! use vdif::mux::{DemuxConfig, Demuxer};
//!
//! let config = DemuxConfig::builder()
//!     .input_frame_size(8032)
//!     .input_frames_per_second(25600)
//!     .bits_per_sample(2)
//!     .thread_ids(vec![0, 1])
//!     .max_reorder_depth(8)
//!     .max_gap_frames(16)
//!     .build();
//! let mut demuxer = Demuxer::new(config).unwrap();
//! assert_eq!(demuxer.output_frame_size(), 16_032);
//!
//! let mut dest = vec![0u8; demuxer.dest_len(100).unwrap()];
//! let stats = demuxer.demux(&mut dest, 100, &[]).unwrap();
//! assert_eq!(stats.output_frames, 0);
//! ```
pub mod cornerturn;
mod stream;

pub use stream::DemuxedFrames;

use serde::{Deserialize, Serialize};
use tracing::{debug, span, trace, Level};
use typed_builder::TypedBuilder;

use crate::header::{Header, FRAMES_PER_SECOND_SENTINEL, MAX_THREAD_ID};
use crate::synchronizer::is_fill;
use crate::{Error, Result};
use cornerturn::Kernel;

/// Channel index of threads that are not being collected.
const NO_CHANNEL: u8 = u8::MAX;

/// Input threads carry at most 32 bits of samples per instant, so at most 32 threads.
const MAX_THREADS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
pub struct DemuxConfig {
    /// Size of each input frame, header included.
    pub input_frame_size: usize,
    /// Frames per second of each input thread.
    pub input_frames_per_second: u32,
    /// Must be 1, 2, 4, or 8.
    pub bits_per_sample: u32,
    /// Threads to collect, in output channel order.
    pub thread_ids: Vec<u16>,
    /// How far, in frames, an input frame may arrive out of order.
    #[builder(default)]
    pub max_reorder_depth: usize,
    /// Largest forward jump, in frames, tolerated before the data is considered to have
    /// ended. Raised to `max_reorder_depth` if smaller.
    #[builder(default = 1)]
    pub max_gap_frames: usize,
}

/// Result of a single [Demuxer::demux] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemuxStats {
    /// Source bytes that will not be needed by a following call.
    pub bytes_consumed: usize,
    /// Output frames written to the start of the destination.
    pub output_frames: usize,
    /// Input frames placed into the destination window.
    pub valid_frames: usize,
    pub good_output_frames: usize,
    /// Output frames marked invalid because a thread was missing.
    pub bad_output_frames: usize,
    /// Bytes skipped because they held the fill pattern.
    pub fill_bytes: usize,
    /// Bytes skipped as unrecognized, from unwanted threads, or discarded on resync.
    pub skipped_bytes: usize,
    /// Bytes of frames with the invalid bit set. These never reach an output slot.
    pub invalid_bytes: usize,
    /// Bytes of frames too old to place in the window.
    pub out_of_order_bytes: usize,
}

/// Reusable demultiplexer for one input configuration.
#[derive(Debug)]
pub struct Demuxer {
    config: DemuxConfig,
    kernel: Kernel,
    output_frame_size: usize,
    /// Frames needed for an anchor on a whole nanosecond.
    granularity: i64,
    /// Output channel of each thread id, or [NO_CHANNEL].
    channel_of: Vec<u8>,
    /// Channels present in each destination slot.
    presence: Vec<u32>,
    good_mask: u32,
}

impl Demuxer {
    /// Validate `config` and create a demultiplexer for it.
    ///
    /// # Errors
    /// [Error::InvalidParameter] listing every violated constraint, or
    /// [Error::UnsupportedShape] if there is no corner-turn kernel for the output shape.
    pub fn new(mut config: DemuxConfig) -> Result<Self> {
        let mut problems = Vec::new();
        let bits = config.bits_per_sample;
        let n_threads = config.thread_ids.len();
        if ![1, 2, 4, 8].contains(&bits) {
            problems.push(format!("bits per sample must be 1, 2, 4, or 8; got {bits}"));
        }
        if n_threads == 0 {
            problems.push("no thread ids".to_string());
        } else if n_threads > MAX_THREADS || n_threads * bits as usize > 32 {
            problems.push(format!(
                "{n_threads} threads of {bits}-bit samples do not fit in 32 bits"
            ));
        }
        let fps = config.input_frames_per_second;
        if fps == 0 || fps >= FRAMES_PER_SECOND_SENTINEL {
            problems.push(format!(
                "frames per second must be 1 to {}; got {fps}",
                FRAMES_PER_SECOND_SENTINEL - 1
            ));
        }
        let frame_size = config.input_frame_size;
        if frame_size <= Header::LEN || frame_size % 8 != 0 {
            problems.push(format!(
                "input frame size must be a multiple of 8 larger than {}; got {frame_size}",
                Header::LEN
            ));
        }

        let mut channel_of = vec![NO_CHANNEL; usize::from(MAX_THREAD_ID) + 1];
        for (chan, &id) in config.thread_ids.iter().enumerate() {
            match channel_of.get_mut(usize::from(id)) {
                None => problems.push(format!("thread id must be 0 to {MAX_THREAD_ID}; got {id}")),
                Some(x) if *x != NO_CHANNEL => problems.push(format!("duplicate thread id {id}")),
                Some(x) => *x = u8::try_from(chan).unwrap_or(NO_CHANNEL),
            }
        }

        if i64::try_from(config.max_reorder_depth).is_err() {
            problems.push(format!(
                "max reorder depth {} is too large",
                config.max_reorder_depth
            ));
        }

        let output_channels = n_threads.max(1).next_power_of_two();
        let output_frame_size = (frame_size.saturating_sub(Header::LEN))
            .saturating_mul(output_channels)
            .saturating_add(Header::LEN);
        if output_frame_size / 8 > 0xff_ffff {
            problems.push(format!("output frame size {output_frame_size} is too large"));
        }
        if !problems.is_empty() {
            return Err(Error::InvalidParameter(problems.join("; ")));
        }
        let kernel = Kernel::select(output_channels, bits)?;

        config.max_gap_frames = config.max_gap_frames.max(config.max_reorder_depth);
        let granularity = i64::from(fps / gcd(fps, 1_000_000_000));

        debug!(
            granularity,
            input_frame_size = frame_size,
            output_frame_size,
            output_channels,
            ?kernel,
            "configured demuxer"
        );

        Ok(Demuxer {
            config,
            kernel,
            output_frame_size,
            granularity,
            channel_of,
            presence: Vec::new(),
            good_mask: ((1u64 << n_threads) - 1) as u32,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Size of each output frame, header included.
    #[must_use]
    pub fn output_frame_size(&self) -> usize {
        self.output_frame_size
    }

    /// Number of channels in each output frame; the thread count rounded up to a power of 2.
    #[must_use]
    pub fn output_channels(&self) -> usize {
        self.kernel.channels()
    }

    /// Destination bytes needed for a call producing up to `max_output_frames` frames.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if the size does not fit in a `usize`.
    pub fn dest_len(&self, max_output_frames: usize) -> Result<usize> {
        self.capacity(max_output_frames)?
            .checked_mul(self.output_frame_size)
            .ok_or_else(|| too_many_frames(max_output_frames))
    }

    /// Destination slots needed for `max_output_frames` frames.
    fn capacity(&self, max_output_frames: usize) -> Result<usize> {
        max_output_frames
            .checked_add(self.config.max_reorder_depth)
            .and_then(|x| x.checked_add(1))
            .ok_or_else(|| too_many_frames(max_output_frames))
    }

    /// Anchor for a window whose first frame is `frame_number`, leaving room for
    /// reordering and starting on a whole nanosecond.
    fn anchor(&self, frame_number: i64) -> i64 {
        let start = (frame_number - self.config.max_reorder_depth as i64).max(0);
        start - start.rem_euclid(self.granularity)
    }

    /// Demultiplex `src` into `dest`.
    ///
    /// Output frames are written contiguously from the start of `dest`, which must be at
    /// least [Demuxer::dest_len] bytes. The call stops when the source is exhausted, when
    /// the destination window is full, or when the data jumps forward by more than
    /// `max_gap_frames` after the first `max_reorder_depth` frames. In the last two cases
    /// frames continue to be gathered until `max_reorder_depth` frames have failed to fit.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if `dest` is too short or `max_output_frames` is too large
    /// to size a destination for.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn demux(
        &mut self,
        dest: &mut [u8],
        max_output_frames: usize,
        src: &[u8],
    ) -> Result<DemuxStats> {
        let span = span!(Level::DEBUG, "demux", src_len = src.len(), max_output_frames);
        let _guard = span.enter();

        let capacity = self.capacity(max_output_frames)?;
        let needed = self.dest_len(max_output_frames)?;
        let out_size = self.output_frame_size;
        if dest.len() < needed {
            return Err(Error::InvalidParameter(format!(
                "destination must be at least {needed} bytes; got {}",
                dest.len()
            )));
        }
        self.presence.clear();
        self.presence.resize(capacity, 0);

        let frame_size = self.config.input_frame_size;
        let data_len = frame_size - Header::LEN;
        let fps = i64::from(self.config.input_frames_per_second);
        let sort = self.config.max_reorder_depth;
        let gap = self.config.max_gap_frames;

        let mut stats = DemuxStats::default();
        let mut start: Option<i64> = None;
        let mut template: Option<Header> = None;
        let mut highest = 0usize;
        let mut shutdown_at: Option<usize> = None;
        let mut n_end = 0usize;
        let mut i = 0usize;

        while i + frame_size <= src.len() {
            if is_fill(src, i + frame_size - 4) {
                i += frame_size;
                stats.fill_bytes += frame_size;
                continue;
            }
            if is_fill(src, i) {
                i += 8;
                stats.fill_bytes += 8;
                continue;
            }
            let hdr = Header::decode(&src[i..])?;
            if hdr.legacy
                || hdr.frame_bytes() != frame_size
                || hdr.num_channels() != 1
                || hdr.bits_per_sample() != self.config.bits_per_sample
            {
                i += 1;
                stats.skipped_bytes += 1;
                continue;
            }
            if hdr.invalid {
                i += frame_size;
                stats.invalid_bytes += frame_size;
                continue;
            }
            let chan = self.channel_of[usize::from(hdr.thread_id)];
            if chan == NO_CHANNEL {
                trace!(thread_id = hdr.thread_id, offset = i, "discarding frame");
                i += frame_size;
                stats.skipped_bytes += frame_size;
                continue;
            }

            let frame_number = i64::from(hdr.seconds) * fps + i64::from(hdr.frame);
            let anchor = match start {
                Some(x) => x,
                None => {
                    let x = self.anchor(frame_number);
                    debug!(start_frame = x, offset = i, "window anchored");
                    template = Some(self.output_template(hdr)?);
                    start = Some(x);
                    x
                }
            };

            let mut slot = frame_number - anchor + 1;
            if slot < 1 {
                i += frame_size;
                stats.out_of_order_bytes += frame_size;
                continue;
            }
            if slot as usize > highest.saturating_add(gap) && (slot as usize) < capacity {
                if stats.valid_frames > sort {
                    trace!(offset = i, slot, highest, "gap in data");
                    shutdown_at.get_or_insert(i);
                    i += frame_size;
                    n_end += 1;
                    if n_end >= sort {
                        break;
                    }
                    continue;
                }
                // Still within the first frames; start over at this frame.
                self.presence[..=highest].fill(0);
                highest = 0;
                stats.skipped_bytes += stats.valid_frames * frame_size;
                stats.valid_frames = 0;
                let x = self.anchor(frame_number);
                debug!(start_frame = x, offset = i, "window re-anchored");
                start = Some(x);
                slot = frame_number - x + 1;
            }
            if slot as usize >= capacity {
                shutdown_at.get_or_insert(i);
                i += frame_size;
                n_end += 1;
                if n_end >= sort {
                    break;
                }
                continue;
            }

            let slot = slot as usize;
            let offset = slot * out_size + Header::LEN + usize::from(chan) * data_len;
            dest[offset..offset + data_len].copy_from_slice(&src[i + Header::LEN..i + frame_size]);
            self.presence[slot] |= 1 << chan;
            stats.valid_frames += 1;
            highest = highest.max(slot);
            i += frame_size;
        }
        stats.bytes_consumed = shutdown_at.unwrap_or(i);

        if let (Some(start), Some(template)) = (start, template) {
            self.corner_turn(dest, highest, start, template, &mut stats)?;
        }

        debug!(
            bytes_consumed = stats.bytes_consumed,
            output_frames = stats.output_frames,
            valid_frames = stats.valid_frames,
            good = stats.good_output_frames,
            bad = stats.bad_output_frames,
            fill_bytes = stats.fill_bytes,
            skipped_bytes = stats.skipped_bytes,
            invalid_bytes = stats.invalid_bytes,
            out_of_order_bytes = stats.out_of_order_bytes,
            "demux complete"
        );
        Ok(stats)
    }

    fn output_template(&self, mut hdr: Header) -> Result<Header> {
        hdr.set_num_channels(self.kernel.channels() as u64)?;
        hdr.thread_id = 0;
        hdr.invalid = false;
        hdr.frame_length = u32::try_from(self.output_frame_size).map_err(|_| Error::Overflow)?;
        Ok(hdr)
    }

    /// Pass 2: turn slots `1..=highest` into output frames at `0..highest`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn corner_turn(
        &self,
        dest: &mut [u8],
        highest: usize,
        start: i64,
        template: Header,
        stats: &mut DemuxStats,
    ) -> Result<()> {
        let out_size = self.output_frame_size;
        let data_len = self.config.input_frame_size - Header::LEN;
        let n_threads = self.config.thread_ids.len();
        let fps = self.config.input_frames_per_second;

        let mut hdr = template;
        hdr.seconds = (start / i64::from(fps)) as u32;
        hdr.frame = (start % i64::from(fps)) as u32;

        for f in 1..=highest {
            let (head, tail) = dest.split_at_mut(f * out_size);
            let out = &mut head[(f - 1) * out_size..];
            let slot = &mut tail[..out_size];

            let complete = self.presence[f] == self.good_mask;
            hdr.invalid = !complete;
            hdr.encode_into(out)?;
            if complete {
                slot[Header::LEN + n_threads * data_len..].fill(0);
                let inputs: Vec<&[u8]> = slot[Header::LEN..].chunks_exact(data_len).collect();
                self.kernel.apply(&mut out[Header::LEN..], &inputs)?;
                stats.good_output_frames += 1;
            } else {
                stats.bad_output_frames += 1;
            }
            if f < highest {
                hdr.next_frame(fps)?;
            }
        }
        stats.output_frames = highest;
        Ok(())
    }
}

/// Demultiplex `src` into `dest` with a one-off [Demuxer].
///
/// `dest` must hold `max_output_frames + max_reorder_depth + 1` output frames.
///
/// # Errors
/// See [Demuxer::new] and [Demuxer::demux].
#[allow(clippy::too_many_arguments)]
pub fn demux(
    dest: &mut [u8],
    max_output_frames: usize,
    src: &[u8],
    input_frame_size: usize,
    input_frames_per_second: u32,
    bits_per_sample: u32,
    thread_ids: &[u16],
    max_reorder_depth: usize,
    max_gap_frames: usize,
) -> Result<DemuxStats> {
    let config = DemuxConfig::builder()
        .input_frame_size(input_frame_size)
        .input_frames_per_second(input_frames_per_second)
        .bits_per_sample(bits_per_sample)
        .thread_ids(thread_ids.to_vec())
        .max_reorder_depth(max_reorder_depth)
        .max_gap_frames(max_gap_frames)
        .build();
    Demuxer::new(config)?.demux(dest, max_output_frames, src)
}

fn too_many_frames(max_output_frames: usize) -> Error {
    Error::InvalidParameter(format!(
        "{max_output_frames} output frames do not fit in a destination buffer"
    ))
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
