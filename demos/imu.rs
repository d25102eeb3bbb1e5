//! Feed synthetic IMU packets through the calibration compensator.
//!
//! The simulated device reports a calibration with a 2% accelerometer scale
//! error and a temperature-dependent gyro drift; the demo prints raw and
//! compensated values side by side.
//!
//! Usage: cargo run --example imu [assembly|drift]

use stereocam::{
    Device, Extrinsics, ImuIntrinsics, ImuPacket, ImuSegment, MotionIntrinsics, OpenParams,
    PipelineConfig, ProcessMode, PushBackend,
};
use std::sync::Arc;
use std::time::Duration;

fn calibration() -> MotionIntrinsics {
    let mut accel = ImuIntrinsics::identity();
    accel.scale = [[1.0 / 1.02, 0.0, 0.0], [0.0, 1.0 / 1.02, 0.0], [0.0, 0.0, 1.0 / 1.02]];
    let mut gyro = ImuIntrinsics::identity();
    gyro.warm_drift = [[0.1, 0.002], [-0.05, 0.001], [0.0, 0.003]];
    MotionIntrinsics { accel, gyro }
}

fn main() {
    env_logger::init();

    let mode = match std::env::args().nth(1).as_deref() {
        Some("drift") => ProcessMode::WARM_DRIFT,
        Some("assembly") | None => ProcessMode::ASSEMBLY,
        Some(other) => {
            eprintln!("Unknown mode '{}' (expected assembly|drift)", other);
            std::process::exit(2);
        }
    };

    let backend = Arc::new(PushBackend::new().with_calibration(calibration(), Extrinsics::identity()));
    let mut device = Device::new(backend.clone(), PipelineConfig::from_env());
    device.enable_process_mode(mode).unwrap();
    if let Err(e) = device.open(OpenParams::default()) {
        eprintln!("Failed to open device: {}", e);
        std::process::exit(1);
    }

    println!("Process mode: {:?}", mode);
    if let Some(ex) = device.motion_extrinsics() {
        println!("Camera to IMU translation: {:?}", ex.translation);
    }

    for tick in 0..50u64 {
        let packet = ImuPacket {
            segments: vec![
                ImuSegment {
                    flag: 1,
                    timestamp: tick * 5000,
                    temperature: 80,
                    accel_or_gyro: [0, 0, 5570],
                },
                ImuSegment {
                    flag: 2,
                    timestamp: tick * 5000 + 2500,
                    temperature: 80,
                    accel_or_gyro: [33, -33, 0],
                },
            ],
        };
        backend.push_imu(&packet);

        for s in device.retrieve_imu_batch().unwrap_or_default() {
            println!(
                "{:?}\tts={:<8} temp={:.2}C  accel=[{:+.4}, {:+.4}, {:+.4}]  gyro=[{:+.4}, {:+.4}, {:+.4}]",
                s.flag,
                s.timestamp,
                s.temperature,
                s.accel[0],
                s.accel[1],
                s.accel[2],
                s.gyro[0],
                s.gyro[1],
                s.gyro[2],
            );
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    device.close();
}
