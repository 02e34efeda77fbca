use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::{trace, warn};

use super::Demuxer;
use crate::header::Header;
use crate::{Error, Result};

/// Iterator of demultiplexed output frames read from a multi-thread VDIF stream.
///
/// Source bytes not consumed by one [Demuxer::demux] call are carried into the next.
/// Successive calls overlap by the reorder depth, so an output frame is only yielded if it
/// is later than the previously yielded frame. Incomplete frames ahead of the first
/// complete one are dropped.
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use vdif::mux::{DemuxConfig, DemuxedFrames, Demuxer};
///
/// let config = DemuxConfig::builder()
///     .input_frame_size(1032)
///     .input_frames_per_second(1000)
///     .bits_per_sample(2)
///     .thread_ids(vec![0, 1])
///     .build();
/// let demuxer = Demuxer::new(config).unwrap();
/// let frames = DemuxedFrames::new(Cursor::new(Vec::new()), demuxer, 64).unwrap();
/// assert_eq!(frames.count(), 0);
/// ```
pub struct DemuxedFrames<R> {
    reader: R,
    demuxer: Demuxer,
    frames_per_call: usize,
    src: Vec<u8>,
    filled: usize,
    dest: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
    last_time: Option<(u32, u32)>,
    eof: bool,
    done: bool,
}

impl<R: Read> DemuxedFrames<R> {
    /// Demultiplex `reader` producing up to `frames_per_call` output frames per
    /// [Demuxer::demux] call.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if the buffers for `frames_per_call` frames are too large
    /// to size.
    pub fn new(reader: R, demuxer: Demuxer, frames_per_call: usize) -> Result<Self> {
        let frames_per_call = frames_per_call.max(1);
        let config = demuxer.config();
        let src_len = frames_per_call
            .checked_add(config.max_reorder_depth)
            .and_then(|x| x.checked_mul(config.thread_ids.len()))
            .and_then(|x| x.checked_mul(config.input_frame_size))
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "source buffer for {frames_per_call} frames per call is too large"
                ))
            })?;
        let dest_len = demuxer.dest_len(frames_per_call)?;
        Ok(DemuxedFrames {
            reader,
            demuxer,
            frames_per_call,
            src: vec![0u8; src_len],
            filled: 0,
            dest: vec![0u8; dest_len],
            pending: VecDeque::new(),
            last_time: None,
            eof: false,
            done: false,
        })
    }

    fn fill(&mut self) -> Result<()> {
        while !self.eof && self.filled < self.src.len() {
            match self.reader.read(&mut self.src[self.filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn collect(&mut self, output_frames: usize) {
        let size = self.demuxer.output_frame_size();
        for frame in self.dest.chunks_exact(size).take(output_frames) {
            let Ok(hdr) = Header::decode(frame) else {
                continue;
            };
            let time = (hdr.seconds, hdr.frame);
            match self.last_time {
                None if hdr.invalid => continue,
                Some(last) if time <= last => {
                    trace!(seconds = time.0, frame = time.1, "dropping overlapping frame");
                    continue;
                }
                _ => {}
            }
            self.last_time = Some(time);
            self.pending.push_back(frame.to_vec());
        }
    }

    fn step(&mut self) -> Result<()> {
        self.fill()?;
        let frame_size = self.demuxer.config().input_frame_size;
        if self.filled < frame_size {
            if self.filled > 0 {
                trace!(bytes = self.filled, "discarding partial frame at end of stream");
            }
            self.done = true;
            return Ok(());
        }

        let stats = self.demuxer.demux(
            &mut self.dest,
            self.frames_per_call,
            &self.src[..self.filled],
        )?;
        self.collect(stats.output_frames);

        let mut consumed = stats.bytes_consumed;
        if consumed == 0 {
            warn!(bytes = frame_size, "no source bytes consumed; dropping a frame");
            consumed = frame_size;
        }
        self.src.copy_within(consumed..self.filled, 0);
        self.filled -= consumed;
        Ok(())
    }
}

impl<R: Read> Iterator for DemuxedFrames<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.step() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}
