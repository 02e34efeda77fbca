#![allow(dead_code)]

use vdif::header::{Header, FILL_PATTERN};

pub const EPOCH: u8 = 46;
pub const BASE_SECOND: u32 = 1_000;

/// Build a single-channel frame whose payload is `payload` repeated to fill `frame_size`.
pub fn frame(thread: u16, number: u64, fps: u32, frame_size: usize, payload: &[u8]) -> Vec<u8> {
    let mut hdr = Header::new(
        frame_size - Header::LEN,
        u32::from(thread),
        2,
        1,
        false,
        *b"Ts",
    )
    .expect("test frame parameters should be valid");
    hdr.epoch = EPOCH;
    hdr.seconds = BASE_SECOND + u32::try_from(number / u64::from(fps)).unwrap();
    hdr.frame = u32::try_from(number % u64::from(fps)).unwrap();

    let mut dat = hdr.encode();
    dat.extend(payload.iter().cycle().take(frame_size - Header::LEN));
    dat
}

/// Frames `numbers` for each `(thread, payload byte)`, interleaved round-robin.
pub fn interleaved(
    threads: &[(u16, u8)],
    numbers: impl IntoIterator<Item = u64>,
    fps: u32,
    frame_size: usize,
) -> Vec<u8> {
    let mut dat = Vec::new();
    for n in numbers {
        for (thread, byte) in threads {
            dat.extend(frame(*thread, n, fps, frame_size, &[*byte]));
        }
    }
    dat
}

/// A frame made entirely of fill pattern.
pub fn fill_frame(frame_size: usize) -> Vec<u8> {
    FILL_PATTERN.to_le_bytes().repeat(frame_size / 4)
}
