//! Locating VDIF frame boundaries in raw byte buffers.
//!
//! VDIF has no sync marker, so a frame boundary is recognized by a header that agrees
//! with the header one frame later.
use crate::header::{word, Header, FILL_PATTERN};
use crate::{Error, Result};

/// Headers one frame apart must have seconds within this many seconds of each other.
const MAX_SECONDS_DIFF: u32 = 2;

/// True if the 4 bytes at `offset` are the fill pattern.
#[inline]
#[must_use]
pub fn is_fill(buf: &[u8], offset: usize) -> bool {
    buf.len() >= offset.saturating_add(4) && word(&buf[offset..], 0) == FILL_PATTERN
}

/// Find the first offset in `buf` where a frame of `frame_size` bytes starts.
///
/// An offset qualifies when both the header there and the header `frame_size` bytes later
/// declare a frame length of `frame_size` and their seconds differ by less than 2.
///
/// # Errors
/// [Error::InvalidParameter] if `frame_size` cannot hold a header, [Error::NoSyncFound] if
/// there is no qualifying offset.
pub fn find_frame_offset(buf: &[u8], frame_size: usize) -> Result<usize> {
    if frame_size < Header::LEN {
        return Err(Error::InvalidParameter(format!(
            "frame size must be at least {}; got {frame_size}",
            Header::LEN
        )));
    }
    let mut offset = 0;
    while offset + frame_size + Header::LEN <= buf.len() {
        if let (Ok(first), Ok(second)) = (
            Header::decode(&buf[offset..]),
            Header::decode(&buf[offset + frame_size..]),
        ) {
            if first.frame_bytes() == frame_size
                && second.frame_bytes() == frame_size
                && first.seconds.abs_diff(second.seconds) < MAX_SECONDS_DIFF
            {
                return Ok(offset);
            }
        }
        offset += 1;
    }
    Err(Error::NoSyncFound)
}

/// Determine the frame size of the data in `buf`.
///
/// Returns the frame length declared by the first header that is followed by two more
/// headers, each one frame apart, declaring the same length.
///
/// # Errors
/// [Error::NoSyncFound] if no such run of headers exists.
pub fn determine_frame_size(buf: &[u8]) -> Result<usize> {
    let mut offset = 0;
    while offset + Header::LEN <= buf.len() {
        let hdr = Header::decode(&buf[offset..])?;
        let size = hdr.frame_bytes();
        if size >= hdr.header_len() && offset + 2 * size + Header::LEN <= buf.len() {
            let agrees = |at: usize| {
                Header::decode(&buf[at..]).is_ok_and(|h| h.frame_bytes() == size)
            };
            if agrees(offset + size) && agrees(offset + 2 * size) {
                return Ok(size);
            }
        }
        offset += 1;
    }
    Err(Error::NoSyncFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_SIZE: usize = 96;

    fn frame(seconds: u32, frame: u32) -> Vec<u8> {
        let mut hdr = Header::new(FRAME_SIZE - Header::LEN, 0, 2, 1, false, *b"Tt").unwrap();
        hdr.seconds = seconds;
        hdr.frame = frame;
        let mut dat = hdr.encode();
        dat.resize(FRAME_SIZE, 0x5a);
        dat
    }

    fn stream(prefix: &[u8], count: u32) -> Vec<u8> {
        let mut dat = prefix.to_vec();
        for i in 0..count {
            dat.extend(frame(100, i));
        }
        dat
    }

    #[test]
    fn offset_of_clean_stream_is_zero() {
        let dat = stream(&[], 3);
        assert_eq!(find_frame_offset(&dat, FRAME_SIZE).unwrap(), 0);
    }

    #[test]
    fn offset_skips_garbage() {
        let dat = stream(&[0xee; 13], 3);
        assert_eq!(find_frame_offset(&dat, FRAME_SIZE).unwrap(), 13);
    }

    #[test]
    fn offset_rejects_headers_far_apart_in_time() {
        let mut dat = frame(100, 0);
        dat.extend(frame(102, 0));
        dat.extend(frame(103, 0));
        // only the second and third frames agree
        assert_eq!(find_frame_offset(&dat, FRAME_SIZE).unwrap(), FRAME_SIZE);
    }

    #[test]
    fn offset_needs_two_headers() {
        let dat = stream(&[], 1);
        assert!(matches!(
            find_frame_offset(&dat, FRAME_SIZE),
            Err(Error::NoSyncFound)
        ));
        assert!(matches!(
            find_frame_offset(&dat, 8),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn frame_size_detected() {
        let dat = stream(&[0xee; 7], 4);
        assert_eq!(determine_frame_size(&dat).unwrap(), FRAME_SIZE);
    }

    #[test]
    fn frame_size_needs_three_frames() {
        let dat = stream(&[], 2);
        assert!(matches!(determine_frame_size(&dat), Err(Error::NoSyncFound)));
    }

    #[test]
    fn fill_detection() {
        let mut dat = vec![0u8; 12];
        dat[4..8].copy_from_slice(&FILL_PATTERN.to_le_bytes());
        assert_eq!(&dat[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert!(!is_fill(&dat, 0));
        assert!(is_fill(&dat, 4));
        assert!(!is_fill(&dat, 10));
    }
}
