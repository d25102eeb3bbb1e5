//! # stereocam - capture and synthesis pipeline for stereo depth cameras
//!
//! Pulls frames and side-channel packets from a hardware [`Backend`],
//! matches color frames with their metadata by frame id, splits
//! side-by-side composites into left and right images, compensates IMU
//! samples with the device calibration and buffers everything in bounded
//! queues for the application to drain. Provides:
//! - An owned [`Device`] session with explicit open/close
//! - [`PushBackend`] for feeding the pipeline from the host process
//! - Decoding of IMU packets and the on-device rectification record
//! - C FFI for integration with C/C++ hosts
//!
//! ## Quick Start
//! ```no_run
//! use stereocam::{Device, FrameKind, OpenParams, PipelineConfig, PushBackend, StreamType};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(PushBackend::new());
//! let mut device = Device::new(backend.clone(), PipelineConfig::from_env());
//! device.enable_stream(StreamType::LeftColor).unwrap();
//! device.open(OpenParams::default()).unwrap();
//!
//! loop {
//!     for sample in device.retrieve_all(StreamType::LeftColor).unwrap() {
//!         println!("frame {} metadata {:?}", sample.image.frame_id, sample.metadata);
//!     }
//!     device.wait();
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod protocol;
pub mod calibration;
pub mod queue;
pub mod rate;
pub mod imu;
pub mod backend;
mod worker;
mod capture;
pub mod synthesis;
pub mod device;
pub mod ffi;

pub use backend::{Backend, PushBackend, SideChannelSink};
pub use config::{OpenParams, PipelineConfig};
pub use device::Device;
pub use error::StereoCamError;
pub use protocol::{ImuPacket, ImuSegment, MetadataPacket, RectifyLogData, RectifyLogLayout};
pub use rate::Rate;
pub use types::*;

/// Result type alias for stereocam operations.
pub type Result<T> = std::result::Result<T, StereoCamError>;
