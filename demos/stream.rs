//! Run the pipeline on synthetic side-by-side frames and print what comes out.
//!
//! A generator thread plays the device: it submits a 2560x720 Gray8 composite
//! and, a little later, that frame's metadata. Every 7th metadata record is
//! skipped to show that unmatched frames are dropped.
//!
//! Usage: cargo run --example stream [seconds]

use stereocam::{
    Device, FrameKind, MetadataPacket, OpenParams, PipelineConfig, PixelFormat, PushBackend,
    RawFrame, StreamType,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn generate(backend: Arc<PushBackend>, running: Arc<AtomicBool>, fps: u32) {
    let (w, h) = (2560u32, 720u32);
    let period = Duration::from_secs(1) / fps;
    let start = Instant::now();
    let mut id: u16 = 0;

    while running.load(Ordering::Relaxed) {
        let shade = (id % 256) as u8;
        let frame = RawFrame::new(id, w, h, PixelFormat::Gray8, vec![shade; (w * h) as usize]);
        backend.submit_frame(FrameKind::Color, frame);

        std::thread::sleep(Duration::from_millis(2));
        if id % 7 != 0 {
            backend.push_metadata(MetadataPacket {
                frame_id: id,
                timestamp: start.elapsed().as_micros() as u32,
                exposure_time: 33,
            });
        }

        id = id.wrapping_add(1);
        std::thread::sleep(period.saturating_sub(Duration::from_millis(2)));
    }
}

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let backend = Arc::new(PushBackend::new());
    let mut device = Device::new(backend.clone(), PipelineConfig::from_env());
    device.enable_stream(StreamType::LeftColor).unwrap();
    device.enable_stream(StreamType::RightColor).unwrap();

    let params = OpenParams {
        framerate: 30,
        ..OpenParams::default()
    };
    if let Err(e) = device.open(params) {
        eprintln!("Failed to open device: {}", e);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    let generator = {
        let backend = backend.clone();
        let running = running.clone();
        std::thread::spawn(move || generate(backend, running, 30))
    };

    println!("Streaming for {}s...", seconds);
    let start = Instant::now();
    let mut left_count: u64 = 0;
    let mut right_count: u64 = 0;

    while start.elapsed() < Duration::from_secs(seconds) {
        let left = device.retrieve_all(StreamType::LeftColor).unwrap_or_default();
        let right = device.retrieve_all(StreamType::RightColor).unwrap_or_default();

        for sample in &left {
            if let Some(m) = sample.metadata {
                println!(
                    "left  id={:<5} {}x{}  ts={:<10} exposure={}",
                    sample.image.frame_id, sample.image.width, sample.image.height, m.timestamp, m.exposure_time
                );
            }
        }
        left_count += left.len() as u64;
        right_count += right.len() as u64;
        device.wait();
    }

    running.store(false, Ordering::Relaxed);
    let _ = generator.join();
    device.close();

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} left / {} right in {:.1}s ({:.1} Hz)",
        left_count,
        right_count,
        elapsed,
        left_count as f64 / elapsed
    );
}
