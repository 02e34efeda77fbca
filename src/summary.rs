//! Summarizing VDIF files from their first and last few megabytes.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::header::{Header, MAX_THREAD_ID};
use crate::synchronizer::{determine_frame_size, find_frame_offset};
use crate::Result;

/// Number of bytes read from each end of the source.
pub const WINDOW_SIZE: usize = 2_000_000;

/// Maximum number of thread ids recorded in [FrameSummary::thread_ids].
pub const MAX_SUMMARY_THREADS: usize = 64;

/// Overview of a VDIF byte source.
///
/// Only the head and tail windows of the source are examined, so threads that appear only
/// in the middle of a large file will not be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub file_size: u64,
    pub frame_size: usize,
    pub epoch: u8,
    pub bits_per_sample: u32,
    /// Observed thread ids in increasing order, at most [MAX_SUMMARY_THREADS].
    pub thread_ids: Vec<u16>,
    /// Number of distinct threads observed, including those not in `thread_ids`.
    pub n_threads: usize,
    pub start_second: u32,
    pub start_frame: u32,
    pub end_second: u32,
    pub end_frame: u32,
    /// Offset of the first synchronized frame in the source.
    pub first_frame_offset: usize,
}

impl FrameSummary {
    /// MJD of the day the first frame falls on.
    #[must_use]
    pub fn start_mjd(&self) -> i64 {
        let epoch = Header {
            epoch: self.epoch,
            ..Default::default()
        };
        epoch.epoch_mjd() + i64::from(self.start_second / 86_400)
    }

    /// Number of frames per thread between the first and last frame, inclusive.
    #[must_use]
    pub fn duration_frames(&self, frames_per_second: u32) -> u64 {
        let start = u64::from(self.start_second) * u64::from(frames_per_second)
            + u64::from(self.start_frame);
        let end = u64::from(self.end_second) * u64::from(frames_per_second)
            + u64::from(self.end_frame);
        (end + 1).saturating_sub(start)
    }
}

struct Accumulator {
    frame_size: usize,
    epoch: u8,
    bits_per_sample: u32,
    start: (u32, u32),
    end: (u32, u32),
    has_thread: Vec<bool>,
}

impl Accumulator {
    /// Walk `buf` from `offset`, stepping a frame at a time over frames that agree with
    /// `reference` and a byte at a time otherwise.
    fn scan(&mut self, buf: &[u8], mut offset: usize, reference: &Header) {
        let limit = buf.len().saturating_sub(self.frame_size + Header::LEN);
        while offset < limit {
            let Ok(hdr) = Header::decode(&buf[offset..]) else {
                offset += 1;
                continue;
            };
            if hdr.frame_bytes() == self.frame_size
                && hdr.epoch == self.epoch
                && hdr.bits_per_sample() == self.bits_per_sample
                && hdr.seconds.abs_diff(reference.seconds) < 2
            {
                self.add(&hdr);
                offset += self.frame_size;
            } else {
                offset += 1;
            }
        }
    }

    fn add(&mut self, hdr: &Header) {
        self.has_thread[usize::from(hdr.thread_id)] = true;
        let time = (hdr.seconds, hdr.frame);
        if time < self.start {
            self.start = time;
        }
        if time > self.end {
            self.end = time;
        }
    }
}

/// Summarize the VDIF data in `source`.
///
/// A `frame_size_hint` of 0 detects the frame size from the data.
///
/// # Errors
/// [crate::Error::Io] if reading fails or the source is shorter than the window it should
/// hold, [crate::Error::NoSyncFound] if no frames can be found in the head or tail window.
pub fn summarize<R>(source: &mut R, frame_size_hint: usize) -> Result<FrameSummary>
where
    R: Read + Seek,
{
    let file_size = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    let window = if file_size < 2 * WINDOW_SIZE as u64 {
        usize::try_from(file_size).unwrap_or(usize::MAX)
    } else {
        WINDOW_SIZE
    };
    let mut buf = vec![0u8; window];
    source.read_exact(&mut buf)?;

    let frame_size = if frame_size_hint == 0 {
        determine_frame_size(&buf)?
    } else {
        frame_size_hint
    };

    let first_frame_offset = find_frame_offset(&buf, frame_size)?;
    let reference = Header::decode(&buf[first_frame_offset..])?;
    debug!(
        frame_size,
        first_frame_offset,
        window,
        "synchronized head window"
    );

    let mut acc = Accumulator {
        frame_size,
        epoch: reference.epoch,
        bits_per_sample: reference.bits_per_sample(),
        start: (1 << 30, 0),
        end: (0, 0),
        has_thread: vec![false; usize::from(MAX_THREAD_ID) + 1],
    };
    acc.scan(&buf, first_frame_offset, &reference);

    if file_size > window as u64 {
        source.seek(SeekFrom::Start(file_size - window as u64))?;
        source.read_exact(&mut buf)?;
        let offset = find_frame_offset(&buf, frame_size)?;
        let reference = Header::decode(&buf[offset..])?;
        debug!(offset, "synchronized tail window");
        acc.scan(&buf, 0, &reference);
    }

    let observed: Vec<u16> = acc
        .has_thread
        .iter()
        .enumerate()
        .filter(|(_, seen)| **seen)
        .filter_map(|(id, _)| u16::try_from(id).ok())
        .collect();

    Ok(FrameSummary {
        file_size,
        frame_size,
        epoch: acc.epoch,
        bits_per_sample: acc.bits_per_sample,
        n_threads: observed.len(),
        thread_ids: observed.into_iter().take(MAX_SUMMARY_THREADS).collect(),
        start_second: acc.start.0,
        start_frame: acc.start.1,
        end_second: acc.end.0,
        end_frame: acc.end.1,
        first_frame_offset,
    })
}

/// Summarize the VDIF file at `path`. See [summarize].
///
/// # Errors
/// See [summarize].
pub fn summarize_file<P: AsRef<Path>>(path: P, frame_size_hint: usize) -> Result<FrameSummary> {
    let mut file = File::open(path)?;
    summarize(&mut file, frame_size_hint)
}
