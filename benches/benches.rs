use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};

use vdif::header::Header;
use vdif::mux::cornerturn::{generic, Kernel};
use vdif::mux::{DemuxConfig, Demuxer};

const CHANNEL_LEN: usize = 8000;

fn random_channels(channels: usize, len: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    (0..channels)
        .map(|_| (0..len).map(|_| rng.gen()).collect())
        .collect()
}

fn bench_cornerturn(c: &mut Criterion) {
    let mut group = c.benchmark_group("cornerturn");
    for channels in [2, 4, 8, 16] {
        let dat = random_channels(channels, CHANNEL_LEN);
        let inputs: Vec<&[u8]> = dat.iter().map(Vec::as_slice).collect();
        let kernel = Kernel::select(channels, 2).unwrap();
        let mut out = vec![0u8; CHANNEL_LEN * channels];

        group.throughput(Throughput::Bytes(out.len() as u64));
        group.bench_with_input(BenchmarkId::new("kernel", channels), &inputs, |b, inputs| {
            b.iter(|| kernel.apply(&mut out, inputs).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("generic", channels), &inputs, |b, inputs| {
            b.iter(|| generic(&mut out, inputs, 2).unwrap());
        });
    }
    group.finish();
}

fn bench_demux(c: &mut Criterion) {
    const FRAME_SIZE: usize = 8032;
    const FPS: u32 = 25600;
    const FRAMES: u32 = 200;
    let threads: Vec<u16> = (0..4).collect();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut src = Vec::with_capacity(FRAMES as usize * threads.len() * FRAME_SIZE);
    for n in 0..FRAMES {
        for &thread in &threads {
            let mut hdr =
                Header::new(FRAME_SIZE - Header::LEN, u32::from(thread), 2, 1, false, *b"Bm")
                    .unwrap();
            hdr.seconds = 1000 + n / FPS;
            hdr.frame = n % FPS;
            src.extend(hdr.encode());
            src.extend((0..FRAME_SIZE - Header::LEN).map(|_| rng.gen::<u8>()));
        }
    }

    let config = DemuxConfig::builder()
        .input_frame_size(FRAME_SIZE)
        .input_frames_per_second(FPS)
        .bits_per_sample(2)
        .thread_ids(threads)
        .max_reorder_depth(8)
        .max_gap_frames(16)
        .build();
    let mut demuxer = Demuxer::new(config).unwrap();
    let mut dest = vec![0u8; demuxer.dest_len(FRAMES as usize).unwrap()];

    let mut group = c.benchmark_group("demux");
    group.throughput(Throughput::Bytes(src.len() as u64));
    group.bench_function("4_threads", |b| {
        b.iter(|| demuxer.demux(&mut dest, FRAMES as usize, &src).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_cornerturn, bench_demux);
criterion_main!(benches);
