mod common;

use rand::{Rng, SeedableRng};
use vdif::header::Header;
use vdif::mux::{demux, DemuxConfig, DemuxStats, Demuxer};

use common::{fill_frame, frame, interleaved, BASE_SECOND};

const FRAME_SIZE: usize = 1032;
const FPS: u32 = 1000;

fn run(
    threads: &[u16],
    sort: usize,
    gap: usize,
    max_output_frames: usize,
    src: &[u8],
) -> (Demuxer, Vec<u8>, DemuxStats) {
    let config = DemuxConfig::builder()
        .input_frame_size(FRAME_SIZE)
        .input_frames_per_second(FPS)
        .bits_per_sample(2)
        .thread_ids(threads.to_vec())
        .max_reorder_depth(sort)
        .max_gap_frames(gap)
        .build();
    let mut demuxer = Demuxer::new(config).unwrap();
    let mut dest = vec![0u8; demuxer.dest_len(max_output_frames).unwrap()];
    let stats = demuxer.demux(&mut dest, max_output_frames, src).unwrap();
    (demuxer, dest, stats)
}

#[test]
fn single_thread_is_passed_through() {
    let mut src = Vec::new();
    for n in 0..10u64 {
        let payload: Vec<u8> = (0..=250u8).map(|x| x.wrapping_mul(n as u8 + 1)).collect();
        src.extend(frame(0, n, FPS, FRAME_SIZE, &payload));
    }

    let (demuxer, dest, stats) = run(&[0], 0, 1, 10, &src);

    assert_eq!(demuxer.output_frame_size(), FRAME_SIZE);
    assert_eq!(stats.bytes_consumed, src.len());
    assert_eq!(stats.output_frames, 10);
    assert_eq!(stats.good_output_frames, 10);
    assert_eq!(stats.valid_frames, 10);
    assert_eq!(&dest[..src.len()], &src[..]);
}

#[test]
fn two_threads_are_interleaved() {
    let src = interleaved(&[(3, 0xaa), (8, 0x55)], 0..6, FPS, FRAME_SIZE);

    let (demuxer, dest, stats) = run(&[3, 8], 0, 1, 6, &src);

    assert_eq!(stats.output_frames, 6);
    assert_eq!(stats.good_output_frames, 6);
    assert_eq!(stats.bad_output_frames, 0);
    let size = demuxer.output_frame_size();
    assert_eq!(size, 2 * (FRAME_SIZE - Header::LEN) + Header::LEN);

    for (n, out) in dest.chunks_exact(size).take(6).enumerate() {
        let hdr = Header::decode(out).unwrap();
        assert!(!hdr.invalid, "frame {n}");
        assert_eq!(hdr.num_channels(), 2);
        assert_eq!(hdr.thread_id, 0);
        assert_eq!(hdr.frame_bytes(), size);
        assert_eq!((hdr.seconds, hdr.frame), (BASE_SECOND, n as u32));
        // 0xaa is four samples of 0b10 and 0x55 four of 0b01; interleaving gives
        // 10 01 10 01 from least significant bit up
        assert!(
            out[Header::LEN..].iter().all(|b| *b == 0b0110_0110),
            "frame {n} payload"
        );
    }
}

#[test]
fn two_threads_keep_sample_order() {
    let mut src = Vec::new();
    for n in 0..4 {
        // thread 0 samples 0,1,2,3 and thread 1 samples 3,2,1,0 in every byte
        src.extend(frame(0, n, FPS, FRAME_SIZE, &[0b11_10_01_00]));
        src.extend(frame(1, n, FPS, FRAME_SIZE, &[0b00_01_10_11]));
    }

    let (demuxer, dest, stats) = run(&[0, 1], 0, 1, 4, &src);

    assert_eq!(stats.good_output_frames, 4);
    let size = demuxer.output_frame_size();
    for out in dest.chunks_exact(size).take(4) {
        for pair in out[Header::LEN..].chunks_exact(2) {
            // a0 b0 a1 b1 then a2 b2 a3 b3, least significant bits first
            assert_eq!(pair, [0b10_01_11_00, 0b00_11_01_10]);
        }
    }
}

#[test]
fn three_threads_zero_the_unused_channel() {
    let src = interleaved(&[(0, 0xff), (1, 0xff), (2, 0xff)], 0..3, FPS, FRAME_SIZE);

    let (demuxer, dest, stats) = run(&[0, 1, 2], 0, 1, 3, &src);

    assert_eq!(demuxer.output_channels(), 4);
    assert_eq!(stats.good_output_frames, 3);
    let size = demuxer.output_frame_size();
    for out in dest.chunks_exact(size).take(3) {
        // channel 3 occupies the top two bits of every byte
        assert!(out[Header::LEN..].iter().all(|b| *b == 0x3f));
    }
}

#[test]
fn gap_beyond_tolerance_stops() {
    let before = interleaved(&[(0, 0xaa), (1, 0x55)], 0..6, FPS, FRAME_SIZE);
    let after = interleaved(&[(0, 0xaa), (1, 0x55)], 26..32, FPS, FRAME_SIZE);
    let mut src = before.clone();
    src.extend(&after);

    let (_, dest, stats) = run(&[0, 1], 4, 4, 100, &src);

    assert_eq!(stats.bytes_consumed, before.len());
    assert_eq!(stats.valid_frames, 12);
    // 4 empty slots reserved for reordering precede the data
    assert_eq!(stats.output_frames, 10);
    assert_eq!(stats.good_output_frames, 6);
    assert_eq!(stats.bad_output_frames, 4);

    let first = Header::decode(&dest).unwrap();
    assert!(first.invalid);
    assert_eq!((first.seconds, first.frame), (BASE_SECOND - 1, FPS - 4));
}

#[test]
fn fill_and_garbage_are_skipped() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(5);
    let mut src = Vec::new();
    for _ in 0..3 {
        src.extend(fill_frame(FRAME_SIZE));
    }
    let garbage: [u8; 5] = rng.gen();
    src.extend(garbage);
    src.extend(interleaved(&[(0, 0xaa), (1, 0x55)], 0..5, FPS, FRAME_SIZE));

    let (_, _, stats) = run(&[0, 1], 0, 1, 5, &src);

    assert_eq!(stats.fill_bytes, 3 * FRAME_SIZE);
    assert_eq!(stats.skipped_bytes, 5);
    assert_eq!(stats.invalid_bytes, 0);
    assert_eq!(stats.valid_frames, 10);
    assert_eq!(stats.good_output_frames, 5);
    assert_eq!(stats.bytes_consumed, src.len());
}

#[test]
fn leading_fill_word_skips_eight_bytes() {
    let mut src = vec![0x44, 0x33, 0x22, 0x11, 0, 0, 0, 0];
    src.extend(interleaved(&[(0, 0xaa)], 0..2, FPS, FRAME_SIZE));

    let (_, _, stats) = run(&[0], 0, 1, 2, &src);

    assert_eq!(stats.fill_bytes, 8);
    assert_eq!(stats.skipped_bytes, 0);
    assert_eq!(stats.good_output_frames, 2);
}

#[test]
fn missing_thread_marks_output_invalid() {
    let mut src = interleaved(&[(0, 0xaa), (1, 0x55)], 0..2, FPS, FRAME_SIZE);
    src.extend(frame(0, 2, FPS, FRAME_SIZE, &[0xaa]));
    src.extend(interleaved(&[(0, 0xaa), (1, 0x55)], 3..5, FPS, FRAME_SIZE));

    let (demuxer, dest, stats) = run(&[0, 1], 0, 1, 5, &src);

    assert_eq!(stats.output_frames, 5);
    assert_eq!(stats.good_output_frames, 4);
    assert_eq!(stats.bad_output_frames, 1);
    let size = demuxer.output_frame_size();
    let invalid: Vec<bool> = dest
        .chunks_exact(size)
        .take(5)
        .map(|out| Header::decode(out).unwrap().invalid)
        .collect();
    assert_eq!(invalid, [false, false, true, false, false]);
}

#[test]
fn demux_function_matches_demuxer() {
    let src = interleaved(&[(0, 0x12), (1, 0x34)], 0..4, FPS, FRAME_SIZE);
    let (demuxer, expected, expected_stats) = run(&[0, 1], 0, 1, 4, &src);

    let mut dest = vec![0u8; demuxer.dest_len(4).unwrap()];
    let stats = demux(&mut dest, 4, &src, FRAME_SIZE, FPS, 2, &[0, 1], 0, 1).unwrap();

    assert_eq!(stats, expected_stats);
    let len = 4 * demuxer.output_frame_size();
    assert_eq!(dest[..len], expected[..len]);
}
