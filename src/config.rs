use crate::types::{DepthMode, StreamFormat, StreamMode};
use std::time::Duration;

/// Highest frame rate any stream mode accepts.
pub const MAX_FRAMERATE: u32 = 60;
/// Highest frame rate of the 2560x720 composite mode.
pub const MAX_FRAMERATE_COMPOSITE: u32 = 30;
pub const DEFAULT_FRAMERATE: u32 = 10;

/// Parameters used to open a device.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    pub dev_index: u32,
    /// Frames per second, 0 keeps [`DEFAULT_FRAMERATE`].
    pub framerate: u32,
    pub depth_mode: DepthMode,
    pub stream_mode: StreamMode,
    pub color_stream_format: StreamFormat,
    pub depth_stream_format: StreamFormat,
    /// Auto-exposure.
    pub state_ae: bool,
    /// Auto-white balance.
    pub state_awb: bool,
    /// IR projector intensity, `None` leaves the device setting alone.
    pub ir_intensity: Option<u8>,
}

impl Default for OpenParams {
    fn default() -> Self {
        Self {
            dev_index: 0,
            framerate: DEFAULT_FRAMERATE,
            depth_mode: DepthMode::Colorful,
            stream_mode: StreamMode::Stream1280x720,
            color_stream_format: StreamFormat::Yuyv,
            depth_stream_format: StreamFormat::Yuyv,
            state_ae: true,
            state_awb: true,
            ir_intensity: None,
        }
    }
}

impl OpenParams {
    pub fn new(dev_index: u32) -> Self {
        Self {
            dev_index,
            ..Self::default()
        }
    }

    /// Frame rate after applying the default for 0.
    pub fn effective_framerate(&self) -> u32 {
        if self.framerate > 0 {
            self.framerate
        } else {
            DEFAULT_FRAMERATE
        }
    }
}

/// Tuning of the capture/synthesis pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sleep between two polls of the hardware frame accessor.
    pub capture_interval: Duration,
    /// Longest time the synthesizer waits for a staged frame.
    pub synthesis_timeout: Duration,
    /// Sleep between two synthesis cycles.
    pub synthesis_interval: Duration,
    /// Cap of every image result queue.
    pub image_queue_cap: usize,
    /// Staged frames or metadata kept across a desync before being dropped.
    pub resync_backlog: usize,
    /// IMU samples buffered before the first commit to the result queue.
    pub imu_batch_threshold: u64,
    /// Cap of the IMU result queue, `None` for unbounded.
    pub imu_queue_cap: Option<usize>,
    /// Capacity of the metadata channel between side channel and synthesizer.
    pub metadata_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(1),
            synthesis_timeout: Duration::from_secs(1),
            synthesis_interval: Duration::from_millis(1),
            image_queue_cap: 30,
            resync_backlog: 5,
            imu_batch_threshold: 20,
            imu_queue_cap: None,
            metadata_capacity: 256,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `STEREOCAM_*` environment variables.
    ///
    /// - `STEREOCAM_CAPTURE_INTERVAL_MS`
    /// - `STEREOCAM_SYNTHESIS_TIMEOUT_MS`
    /// - `STEREOCAM_SYNTHESIS_INTERVAL_MS`
    /// - `STEREOCAM_IMAGE_QUEUE_CAP`
    /// - `STEREOCAM_RESYNC_BACKLOG`
    /// - `STEREOCAM_IMU_BATCH_THRESHOLD`
    /// - `STEREOCAM_IMU_QUEUE_CAP` (0 = unbounded)
    /// - `STEREOCAM_METADATA_CAPACITY`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let millis = |name: &str, default: Duration| {
            read_u64(&lookup, name)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let imu_queue_cap = match read_u64(&lookup, "STEREOCAM_IMU_QUEUE_CAP") {
            Some(0) => None,
            Some(cap) => Some(cap as usize),
            None => d.imu_queue_cap,
        };

        let config = Self {
            capture_interval: millis("STEREOCAM_CAPTURE_INTERVAL_MS", d.capture_interval),
            synthesis_timeout: millis("STEREOCAM_SYNTHESIS_TIMEOUT_MS", d.synthesis_timeout),
            synthesis_interval: millis("STEREOCAM_SYNTHESIS_INTERVAL_MS", d.synthesis_interval),
            image_queue_cap: read_u64(&lookup, "STEREOCAM_IMAGE_QUEUE_CAP")
                .filter(|&v| v > 0)
                .map_or(d.image_queue_cap, |v| v as usize),
            resync_backlog: read_u64(&lookup, "STEREOCAM_RESYNC_BACKLOG")
                .map_or(d.resync_backlog, |v| v as usize),
            imu_batch_threshold: read_u64(&lookup, "STEREOCAM_IMU_BATCH_THRESHOLD")
                .unwrap_or(d.imu_batch_threshold),
            imu_queue_cap,
            metadata_capacity: read_u64(&lookup, "STEREOCAM_METADATA_CAPACITY")
                .filter(|&v| v > 0)
                .map_or(d.metadata_capacity, |v| v as usize),
        };

        if config != d {
            log::info!("Pipeline config from environment: {:?}", config);
        }
        config
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}='{}': not a non-negative integer", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = PipelineConfig::from_lookup(lookup(&[]));
        assert_eq!(c, PipelineConfig::default());
        assert_eq!(c.image_queue_cap, 30);
        assert_eq!(c.imu_batch_threshold, 20);
        assert_eq!(c.imu_queue_cap, None);
        assert_eq!(c.synthesis_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides() {
        let c = PipelineConfig::from_lookup(lookup(&[
            ("STEREOCAM_CAPTURE_INTERVAL_MS", " 5 "),
            ("STEREOCAM_IMAGE_QUEUE_CAP", "12"),
            ("STEREOCAM_IMU_QUEUE_CAP", "1000"),
            ("STEREOCAM_IMU_BATCH_THRESHOLD", "0"),
        ]));
        assert_eq!(c.capture_interval, Duration::from_millis(5));
        assert_eq!(c.image_queue_cap, 12);
        assert_eq!(c.imu_queue_cap, Some(1000));
        assert_eq!(c.imu_batch_threshold, 0);
        assert_eq!(c.resync_backlog, 5);
    }

    #[test]
    fn test_env_invalid_values_fall_back() {
        let c = PipelineConfig::from_lookup(lookup(&[
            ("STEREOCAM_IMAGE_QUEUE_CAP", "0"),
            ("STEREOCAM_SYNTHESIS_TIMEOUT_MS", "soon"),
            ("STEREOCAM_IMU_QUEUE_CAP", "0"),
        ]));
        assert_eq!(c, PipelineConfig::default());
    }

    #[test]
    fn test_open_params_framerate_default() {
        let mut p = OpenParams::new(2);
        assert_eq!(p.dev_index, 2);
        assert_eq!(p.effective_framerate(), 10);
        p.framerate = 0;
        assert_eq!(p.effective_framerate(), 10);
        p.framerate = 25;
        assert_eq!(p.effective_framerate(), 25);
    }
}
