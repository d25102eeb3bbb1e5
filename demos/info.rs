//! Print device info, calibration and a decoded rectification record.
//!
//! Usage: cargo run --example info

use stereocam::protocol::RECTIFY_LOG_SIZE;
use stereocam::{
    Device, DeviceParams, Extrinsics, ImuIntrinsics, MotionIntrinsics, OpenParams, PipelineConfig,
    PushBackend, RectifyIndex,
};
use std::sync::Arc;

/// A 1280x720 rectification record with only the image sizes and the
/// reprojection matrix filled in.
fn rectify_blob() -> Vec<u8> {
    let mut blob = vec![0u8; RECTIFY_LOG_SIZE];
    blob[0..2].copy_from_slice(&2560u16.to_le_bytes());
    blob[2..4].copy_from_slice(&720u16.to_le_bytes());
    blob[4..6].copy_from_slice(&2560u16.to_le_bytes());
    blob[6..8].copy_from_slice(&720u16.to_le_bytes());
    let q: [f32; 16] = [
        1.0, 0.0, 0.0, -640.0, 0.0, 1.0, 0.0, -360.0, 0.0, 0.0, 0.0, 700.0, 0.0, 0.0, 8.33, 0.0,
    ];
    for (i, v) in q.iter().enumerate() {
        let at = 392 + i * 4;
        blob[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
    blob
}

fn main() {
    env_logger::init();

    let params = DeviceParams {
        name: "Stereo Depth Camera".into(),
        serial_number: "0610243700090720".into(),
        firmware_version: "1.4".into(),
        hardware_version: "2.0".into(),
        spec_version: "1.0".into(),
        lens_type: "0000".into(),
        imu_type: "0000".into(),
        nominal_baseline: 120,
    };
    let extrinsics = Extrinsics {
        rotation: [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0451, 0.0, -0.0123],
    };
    let calibration = MotionIntrinsics {
        accel: ImuIntrinsics::identity(),
        gyro: ImuIntrinsics::identity(),
    };
    let backend = Arc::new(
        PushBackend::new()
            .with_device_params(params)
            .with_calibration(calibration, extrinsics)
            .with_rectify_log(RectifyIndex::Hd, rectify_blob()),
    );

    let mut device = Device::new(backend, PipelineConfig::from_env());
    if let Err(e) = device.open(OpenParams::default()) {
        eprintln!("Failed to open device: {}", e);
        std::process::exit(1);
    }

    if let Some(p) = device.device_params() {
        println!("Name:       {}", p.name);
        println!("Serial:     {}", p.serial_number);
        println!("Firmware:   {}", p.firmware_version);
        println!("Hardware:   {}", p.hardware_version);
        println!("Baseline:   {} mm", p.nominal_baseline);
    }
    println!("Side channel: {}", device.is_side_channel_present());

    if let Some(ex) = device.motion_extrinsics() {
        let inv = ex.inverse();
        println!("\nLeft camera -> IMU: R={:?} t={:?}", ex.rotation, ex.translation);
        println!("IMU -> left camera: R={:?} t={:?}", inv.rotation, inv.translation);
    }

    for index in [RectifyIndex::Hd, RectifyIndex::Vga] {
        match device.rectify_log(index) {
            Some(log) => {
                println!(
                    "\n{:?} rectify: in {}x{} out {}x{}",
                    index, log.in_img_width, log.in_img_height, log.out_img_width, log.out_img_height
                );
                for row in log.reproject_mat.chunks(4) {
                    println!("  {:>9.3} {:>9.3} {:>9.3} {:>9.3}", row[0], row[1], row[2], row[3]);
                }
            }
            None => println!("\n{:?} rectify: not available", index),
        }
    }

    device.close();
}
