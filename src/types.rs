/// Consumer-facing image stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Left half of the color composite, or the whole frame when the
    /// right stream is disabled.
    LeftColor = 0,
    /// Right half of the color composite.
    RightColor = 1,
    Depth = 2,
}

impl StreamType {
    pub fn flag(self) -> Streams {
        match self {
            StreamType::LeftColor => Streams::LEFT_COLOR,
            StreamType::RightColor => Streams::RIGHT_COLOR,
            StreamType::Depth => Streams::DEPTH,
        }
    }
}

/// Hardware-side frame source polled by the capture thread.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Color = 0,
    Depth = 1,
}

bitflags::bitflags! {
    /// Set of enabled consumer streams.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct Streams: u32 {
        const LEFT_COLOR  = 1 << 0;
        const RIGHT_COLOR = 1 << 1;
        const DEPTH       = 1 << 2;
        const ALL = Self::LEFT_COLOR.bits() | Self::RIGHT_COLOR.bits() | Self::DEPTH.bits();
    }
}

impl Streams {
    /// Whether the color hardware stream has to be captured at all.
    pub fn wants_color(self) -> bool {
        self.intersects(Streams::LEFT_COLOR | Streams::RIGHT_COLOR)
    }
}

bitflags::bitflags! {
    /// IMU compensation stages.
    ///
    /// When `ASSEMBLY` is set the scale/assembly correction runs on the raw
    /// reading and temperature drift is not applied, even if `WARM_DRIFT` is
    /// also set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct ProcessMode: u32 {
        const ASSEMBLY   = 1 << 0;
        const WARM_DRIFT = 1 << 1;
        const ALL = Self::ASSEMBLY.bits() | Self::WARM_DRIFT.bits();
    }
}

/// Pixel layout of a raw frame buffer. Conversion between layouts is left
/// to the caller.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv = 0,
    Mjpg = 1,
    Bgr24 = 2,
    Rgb24 = 3,
    Gray8 = 4,
    Gray16 = 5,
}

impl PixelFormat {
    /// Bytes per pixel, `None` for compressed layouts.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Yuyv | PixelFormat::Gray16 => Some(2),
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Mjpg => None,
        }
    }
}

/// Side of a side-by-side stereo composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoHalf {
    Left,
    Right,
}

/// An owned pixel buffer tagged with the sensor's 16-bit frame counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub frame_id: u16,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(frame_id: u16, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            frame_id,
            width,
            height,
            format,
            data,
        }
    }

    /// Cut one half out of a side-by-side composite into a new frame.
    ///
    /// Returns `None` for compressed layouts, for frames too narrow to
    /// split, for YUYV halves that would cut a macropixel and for buffers
    /// shorter than `width * height * bpp`.
    pub fn half(&self, side: StereoHalf) -> Option<RawFrame> {
        let bpp = self.format.bytes_per_pixel()?;
        let width = self.width as usize;
        let height = self.height as usize;
        let half_width = width / 2;
        if half_width == 0 || (self.format == PixelFormat::Yuyv && half_width % 2 != 0) {
            return None;
        }
        let row_bytes = width * bpp;
        if self.data.len() < row_bytes * height {
            return None;
        }

        let half_bytes = half_width * bpp;
        let offset = match side {
            StereoHalf::Left => 0,
            StereoHalf::Right => half_bytes,
        };

        let mut data = Vec::with_capacity(half_bytes * height);
        for row in self.data.chunks_exact(row_bytes).take(height) {
            data.extend_from_slice(&row[offset..offset + half_bytes]);
        }

        Some(RawFrame {
            frame_id: self.frame_id,
            width: half_width as u32,
            height: self.height,
            format: self.format,
            data,
        })
    }
}

/// Per-frame information delivered on the side channel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    pub frame_id: u16,
    /// Sensor timestamp.
    pub timestamp: u32,
    pub exposure_time: u16,
}

/// Unit handed to consumers: an image and, when the side channel matched
/// it, that frame's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSample {
    pub image: RawFrame,
    pub metadata: Option<FrameMetadata>,
}

/// Which IMU channel a sample carries.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuFlag {
    Accel = 1,
    Gyro = 2,
}

impl ImuFlag {
    pub fn from_raw(flag: u8) -> Option<ImuFlag> {
        match flag {
            1 => Some(ImuFlag::Accel),
            2 => Some(ImuFlag::Gyro),
            _ => None,
        }
    }
}

/// One accelerometer or gyroscope reading. Only the channel named by `flag`
/// is populated; the other channel's axes are zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub flag: ImuFlag,
    pub timestamp: u64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Accelerometer [x, y, z] in g.
    pub accel: [f64; 3],
    /// Gyroscope [x, y, z] in deg/s.
    pub gyro: [f64; 3],
}

/// Intrinsics of one IMU sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuIntrinsics {
    /// Scale matrix, scale factors on the diagonal, cross-axis terms elsewhere.
    pub scale: [[f64; 3]; 3],
    /// Assembly error.
    pub assembly: [[f64; 3]; 3],
    /// Zero drift [x, y, z].
    pub drift: [f64; 3],
    /// Noise density variances.
    pub noise: [f64; 3],
    /// Random walk variances.
    pub bias: [f64; 3],
    /// Warm drift per axis as `[constant, slope]` against temperature.
    pub warm_drift: [[f64; 2]; 3],
}

impl ImuIntrinsics {
    /// Unit scale and assembly, no drift.
    pub fn identity() -> Self {
        Self {
            scale: IDENTITY3,
            assembly: IDENTITY3,
            drift: [0.0; 3],
            noise: [0.0; 3],
            bias: [0.0; 3],
            warm_drift: [[0.0; 2]; 3],
        }
    }
}

/// Accelerometer and gyroscope intrinsics loaded from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionIntrinsics {
    pub accel: ImuIntrinsics,
    pub gyro: ImuIntrinsics,
}

pub(crate) const IDENTITY3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Rigid transform between two sensor frames.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    /// 3x3 row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: IDENTITY3,
            translation: [0.0; 3],
        }
    }

    /// Inverse transform: `R' = Rᵀ`, `t' = -Rᵀ·t`.
    pub fn inverse(&self) -> Extrinsics {
        let r = &self.rotation;
        let mut rotation = [[0.0; 3]; 3];
        for (i, row) in rotation.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = r[j][i];
            }
        }

        let t = &self.translation;
        let mut translation = [0.0; 3];
        for (i, v) in translation.iter_mut().enumerate() {
            *v = -(rotation[i][0] * t[0] + rotation[i][1] * t[1] + rotation[i][2] * t[2]);
        }

        Extrinsics {
            rotation,
            translation,
        }
    }
}

/// Static device description read once at open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceParams {
    pub name: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub spec_version: String,
    pub lens_type: String,
    pub imu_type: String,
    /// Nominal stereo baseline in millimeters.
    pub nominal_baseline: u16,
}

/// Rectification record stored on the device, one per output resolution.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifyIndex {
    /// 1280x720 per eye.
    Hd = 0,
    /// 640x480 per eye.
    Vga = 1,
}

/// Color/depth capture resolution.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Stream1280x720 = 0,
    /// Side-by-side left/right composite.
    Stream2560x720 = 1,
    Stream1280x480 = 2,
    Stream640x480 = 3,
}

impl StreamMode {
    pub fn size(self) -> (u32, u32) {
        match self {
            StreamMode::Stream1280x720 => (1280, 720),
            StreamMode::Stream2560x720 => (2560, 720),
            StreamMode::Stream1280x480 => (1280, 480),
            StreamMode::Stream640x480 => (640, 480),
        }
    }
}

/// Wire format of a hardware stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Mjpg = 0,
    Yuyv = 1,
}

/// Depth output transfer applied by the hardware.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    Raw = 0,
    Gray = 1,
    Colorful = 2,
}
