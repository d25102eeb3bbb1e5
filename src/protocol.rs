use crate::types::{FrameMetadata, ImuFlag, ImuSample};
use crate::{Result, StereoCamError};

// -- IMU fixed-point conversion --

/// Temperature LSB in degrees Celsius.
pub const TEMPERATURE_SCALE: f64 = 0.125;
/// Temperature reported for a raw value of zero.
pub const TEMPERATURE_OFFSET: f64 = 23.0;
/// Accelerometer full-scale range in g.
pub const ACCEL_RANGE: f64 = 12.0;
/// Gyroscope full-scale range in deg/s.
pub const GYRO_RANGE: f64 = 2000.0;
const FULL_SCALE: f64 = 65536.0;

/// One accelerometer or gyroscope reading as delivered by the side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSegment {
    /// 1 = accelerometer, 2 = gyroscope.
    pub flag: u8,
    pub timestamp: u64,
    pub temperature: i16,
    pub accel_or_gyro: [i16; 3],
}

/// A batch of IMU segments pushed by one side-channel callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImuPacket {
    pub segments: Vec<ImuSegment>,
}

/// Per-frame information pushed by the side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataPacket {
    pub frame_id: u16,
    pub timestamp: u32,
    pub exposure_time: u16,
}

impl From<MetadataPacket> for FrameMetadata {
    fn from(p: MetadataPacket) -> Self {
        FrameMetadata {
            frame_id: p.frame_id,
            timestamp: p.timestamp,
            exposure_time: p.exposure_time,
        }
    }
}

/// Convert a raw segment to physical units.
///
/// Returns `None` for a segment whose flag is neither accelerometer nor
/// gyroscope.
pub fn parse_imu_segment(seg: &ImuSegment) -> Option<ImuSample> {
    let flag = ImuFlag::from_raw(seg.flag)?;
    let temperature = seg.temperature as f64 * TEMPERATURE_SCALE + TEMPERATURE_OFFSET;

    let scaled = |range: f64| -> [f64; 3] {
        [
            seg.accel_or_gyro[0] as f64 * range / FULL_SCALE,
            seg.accel_or_gyro[1] as f64 * range / FULL_SCALE,
            seg.accel_or_gyro[2] as f64 * range / FULL_SCALE,
        ]
    };

    let (accel, gyro) = match flag {
        ImuFlag::Accel => (scaled(ACCEL_RANGE), [0.0; 3]),
        ImuFlag::Gyro => ([0.0; 3], scaled(GYRO_RANGE)),
    };

    Some(ImuSample {
        flag,
        timestamp: seg.timestamp,
        temperature,
        accel,
        gyro,
    })
}

// -- Rectification log --

/// Size of the rectification record as stored on the device.
pub const RECTIFY_LOG_SIZE: usize = 1024;

/// Byte layout revisions of the rectification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifyLogLayout {
    /// Packed record ending with the 4x4 reprojection matrix at offset 392.
    V1,
}

impl RectifyLogLayout {
    /// Bytes this layout reads from the record.
    pub fn min_len(self) -> usize {
        match self {
            RectifyLogLayout::V1 => 456,
        }
    }
}

/// Stereo rectification parameters of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifyLogData {
    /// Input image width (side-by-side).
    pub in_img_width: u16,
    pub in_img_height: u16,
    /// Output image width (side-by-side).
    pub out_img_width: u16,
    pub out_img_height: u16,
    pub scale_enable: bool,
    pub crop_enable: bool,
    /// Single image width after scaling.
    pub scale_width: u16,
    pub scale_height: u16,
    /// Left camera matrix `fx, 0, cx, 0, fy, cy, 0, 0, 1`.
    pub cam_mat1: [f32; 9],
    /// Left distortion `k1, k2, p1, p2, k3, k4, k5, k6`.
    pub cam_dist1: [f32; 8],
    pub cam_mat2: [f32; 9],
    pub cam_dist2: [f32; 8],
    /// Rotation between left and right camera frames.
    pub rota_mat: [f32; 9],
    /// Translation between left and right camera frames.
    pub tran_mat: [f32; 3],
    /// Left rectification rotation.
    pub l_rota_mat: [f32; 9],
    /// Right rectification rotation.
    pub r_rota_mat: [f32; 9],
    /// Left 3x4 projection matrix in the rectified frame.
    pub new_cam_mat1: [f32; 12],
    pub new_cam_mat2: [f32; 12],
    pub crop_row_begin: u16,
    pub crop_row_end: u16,
    pub crop_col_begin_l: u16,
    pub crop_col_end_l: u16,
    pub scale_col_m: u8,
    pub scale_col_n: u8,
    pub scale_row_m: u8,
    pub scale_row_n: u8,
    /// Reprojection error.
    pub avg_err: f32,
    pub line_buffers: u16,
    pub reproject_mat: [f32; 16],
}

/// Little-endian cursor over a rectification record.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn f32s<const N: usize>(&mut self) -> [f32; N] {
        let mut out = [0f32; N];
        for v in out.iter_mut() {
            *v = self.f32();
        }
        out
    }

    fn align(&mut self, to: usize) {
        self.pos = self.pos.div_ceil(to) * to;
    }
}

/// Decode a rectification record.
pub fn parse_rectify_log(data: &[u8], layout: RectifyLogLayout) -> Result<RectifyLogData> {
    let expected = layout.min_len();
    if data.len() < expected {
        return Err(StereoCamError::InvalidBlob {
            expected,
            actual: data.len(),
        });
    }

    let mut r = Reader::new(data);
    let in_img_width = r.u16();
    let in_img_height = r.u16();
    let out_img_width = r.u16();
    let out_img_height = r.u16();
    let scale_enable = r.i32() != 0;
    let crop_enable = r.i32() != 0;
    let scale_width = r.u16();
    let scale_height = r.u16();
    let cam_mat1 = r.f32s();
    let cam_dist1 = r.f32s();
    let cam_mat2 = r.f32s();
    let cam_dist2 = r.f32s();
    let rota_mat = r.f32s();
    let tran_mat = r.f32s();
    let l_rota_mat = r.f32s();
    let r_rota_mat = r.f32s();
    let new_cam_mat1 = r.f32s();
    let new_cam_mat2 = r.f32s();
    let crop_row_begin = r.u16();
    let crop_row_end = r.u16();
    let crop_col_begin_l = r.u16();
    let crop_col_end_l = r.u16();
    let scale_col_m = r.u8();
    let scale_col_n = r.u8();
    let scale_row_m = r.u8();
    let scale_row_n = r.u8();
    let avg_err = r.f32();
    let line_buffers = r.u16();
    r.align(4);
    let reproject_mat = r.f32s();
    debug_assert_eq!(r.pos, expected);

    Ok(RectifyLogData {
        in_img_width,
        in_img_height,
        out_img_width,
        out_img_height,
        scale_enable,
        crop_enable,
        scale_width,
        scale_height,
        cam_mat1,
        cam_dist1,
        cam_mat2,
        cam_dist2,
        rota_mat,
        tran_mat,
        l_rota_mat,
        r_rota_mat,
        new_cam_mat1,
        new_cam_mat2,
        crop_row_begin,
        crop_row_end,
        crop_col_begin_l,
        crop_col_end_l,
        scale_col_m,
        scale_col_n,
        scale_row_m,
        scale_row_n,
        avg_err,
        line_buffers,
        reproject_mat,
    })
}
