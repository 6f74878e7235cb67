//! Encoder benchmarks.
//!
//! - Full frame encoding at a few resolutions and speed levels
//! - Quantizer selection in the rate model

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use theoraenc::quant::{QuantInfo, QuantTables};
use theoraenc::rate::{RateContext, RateState};
use theoraenc::{Control, EncoderConfig, FrameType, SpeedLevel, TheoraEncoder};
use theoraenc_core::YuvImage;

/// Planes of a test frame with a moving gradient pattern.
fn create_test_planes(width: u32, height: u32, frame_num: u32) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut y = vec![0u8; (width * height) as usize];
    for (i, pixel) in y.iter_mut().enumerate() {
        let row = i as u32 / width;
        let col = i as u32 % width;
        *pixel = ((row + col + frame_num * 3) % 256) as u8;
    }
    let chroma = (width * height / 4) as usize;
    (y, vec![128u8; chroma], vec![128u8; chroma])
}

// ============================================================================
// Frame encoding
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("theora_encode");
    group.sample_size(20);

    let resolutions = [("qcif", 176, 144), ("cif", 352, 288)];
    let levels = [SpeedLevel::Full, SpeedLevel::NoMotion];

    for (name, width, height) in resolutions {
        let frames: Vec<_> = (0..8).map(|n| create_test_planes(width, height, n)).collect();
        for level in levels {
            group.throughput(Throughput::Elements(frames.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{name}_{level:?}"), width * height),
                &frames,
                |b, frames| {
                    b.iter(|| {
                        let config = EncoderConfig::new(width, height).with_bitrate(400_000);
                        let mut encoder = TheoraEncoder::new(config).unwrap();
                        encoder.control(Control::SetSpeedLevel(level)).unwrap();
                        let mut total = 0;
                        for (y, u, v) in frames {
                            encoder
                                .push_frame(&YuvImage::new_420(width, height, y, u, v))
                                .unwrap();
                            if let Some(packet) = encoder.packet_out(false).unwrap() {
                                total += packet.size();
                            }
                        }
                        black_box(total)
                    });
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Rate model
// ============================================================================

fn bench_select_qi(c: &mut Criterion) {
    let tables = QuantTables::new(&QuantInfo::vp31()).unwrap();
    let mut config = EncoderConfig::new(640, 480).with_bitrate(1_000_000);
    config.normalize();
    let rate = RateState::new(&config);
    let ctx = RateContext {
        tables: &tables,
        npixels: config.npixels(),
        quality: 0,
        base_qi: 32,
        keyframe_force: config.keyframe_frequency_force,
        last_key_frame: 10,
    };

    c.bench_function("select_qi_delta", |b| {
        b.iter(|| rate.select_qi(black_box(FrameType::Delta), false, black_box(&ctx)))
    });
}

criterion_group!(benches, bench_encode, bench_select_qi);
criterion_main!(benches);
