//! C FFI layer for stereocam.
//!
//! A session owns a [`PushBackend`] and the [`Device`] fed by it: the host
//! submits frames and side-channel packets, then drains results through
//! the same handle. The generated C header is written to
//! `include/stereocam.h` by cbindgen.

use crate::backend::PushBackend;
use crate::config::{OpenParams, PipelineConfig};
use crate::device::Device;
use crate::error::LastError;
use crate::protocol::{ImuPacket, ImuSegment, MetadataPacket};
use crate::types::{
    DepthMode, FrameKind, FrameMetadata, ImuSample, PixelFormat, ProcessMode, RawFrame,
    StreamFormat, StreamMode, StreamType,
};
use crate::{Result, StereoCamError};
use std::collections::VecDeque;
use std::ffi::{c_char, c_int};
use std::sync::Arc;

thread_local! {
    /// Last error message for C consumers, per calling thread.
    static LAST_ERROR: LastError = const { LastError::new() };
}

fn set_last_error(e: &StereoCamError) {
    LAST_ERROR.with(|slot| slot.set(e));
}

/// Opaque session handle for C consumers.
pub struct ScSession {
    backend: Arc<PushBackend>,
    device: Device,
    /// IMU samples drained from the device but not yet handed to C.
    imu: VecDeque<ImuSample>,
}

/// Open parameters in C-compatible layout. Enum fields use the numeric
/// values of the Rust enums.
#[repr(C)]
pub struct ScOpenParams {
    pub dev_index: u32,
    /// Frames per second, 0 for the default.
    pub framerate: u32,
    /// 0 = 1280x720, 1 = 2560x720, 2 = 1280x480, 3 = 640x480.
    pub stream_mode: c_int,
    /// 0 = MJPG, 1 = YUYV.
    pub color_stream_format: c_int,
    pub depth_stream_format: c_int,
    /// 0 = raw, 1 = gray, 2 = colorful.
    pub depth_mode: c_int,
    pub state_ae: bool,
    pub state_awb: bool,
    /// IR intensity, negative to leave the device setting alone.
    pub ir_intensity: c_int,
}

/// Image description filled by `sc_retrieve_latest`.
#[repr(C)]
pub struct ScImage {
    pub frame_id: u16,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes of pixel data, also set when the caller's buffer was too small.
    pub size: usize,
    pub has_metadata: bool,
    pub metadata: FrameMetadata,
}

fn stream_from_c(v: c_int) -> Result<StreamType> {
    match v {
        0 => Ok(StreamType::LeftColor),
        1 => Ok(StreamType::RightColor),
        2 => Ok(StreamType::Depth),
        _ => Err(StereoCamError::InvalidArgument("stream type")),
    }
}

fn kind_from_c(v: c_int) -> Result<FrameKind> {
    match v {
        0 => Ok(FrameKind::Color),
        1 => Ok(FrameKind::Depth),
        _ => Err(StereoCamError::InvalidArgument("frame kind")),
    }
}

fn format_from_c(v: c_int) -> Result<PixelFormat> {
    match v {
        0 => Ok(PixelFormat::Yuyv),
        1 => Ok(PixelFormat::Mjpg),
        2 => Ok(PixelFormat::Bgr24),
        3 => Ok(PixelFormat::Rgb24),
        4 => Ok(PixelFormat::Gray8),
        5 => Ok(PixelFormat::Gray16),
        _ => Err(StereoCamError::InvalidArgument("pixel format")),
    }
}

fn stream_format_from_c(v: c_int) -> Result<StreamFormat> {
    match v {
        0 => Ok(StreamFormat::Mjpg),
        1 => Ok(StreamFormat::Yuyv),
        _ => Err(StereoCamError::InvalidArgument("stream format")),
    }
}

fn open_params_from_c(p: &ScOpenParams) -> Result<OpenParams> {
    let stream_mode = match p.stream_mode {
        0 => StreamMode::Stream1280x720,
        1 => StreamMode::Stream2560x720,
        2 => StreamMode::Stream1280x480,
        3 => StreamMode::Stream640x480,
        _ => return Err(StereoCamError::InvalidArgument("stream mode")),
    };
    let depth_mode = match p.depth_mode {
        0 => DepthMode::Raw,
        1 => DepthMode::Gray,
        2 => DepthMode::Colorful,
        _ => return Err(StereoCamError::InvalidArgument("depth mode")),
    };

    Ok(OpenParams {
        dev_index: p.dev_index,
        framerate: p.framerate,
        depth_mode,
        stream_mode,
        color_stream_format: stream_format_from_c(p.color_stream_format)?,
        depth_stream_format: stream_format_from_c(p.depth_stream_format)?,
        state_ae: p.state_ae,
        state_awb: p.state_awb,
        ir_intensity: u8::try_from(p.ir_intensity).ok(),
    })
}

/// Report `result` as 0 / -1 and record the error.
fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => {
            LAST_ERROR.with(LastError::clear);
            0
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Create a session. `side_channel` selects whether the simulated device
/// has an IMU/metadata side channel. Pipeline tuning is read from the
/// `STEREOCAM_*` environment variables.
#[no_mangle]
pub extern "C" fn sc_session_new(side_channel: bool) -> *mut ScSession {
    let backend = if side_channel {
        PushBackend::new()
    } else {
        PushBackend::new().without_side_channel()
    };
    let backend = Arc::new(backend);
    let device = Device::new(backend.clone(), PipelineConfig::from_env());
    Box::into_raw(Box::new(ScSession {
        backend,
        device,
        imu: VecDeque::new(),
    }))
}

/// Close the session if open and free it.
///
/// # Safety
/// `s` must be a pointer returned by `sc_session_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_session_free(s: *mut ScSession) {
    if !s.is_null() {
        drop(Box::from_raw(s));
    }
}

/// Enable a consumer stream before opening.
/// `stream`: 0 = left color, 1 = right color, 2 = depth.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_enable_stream(s: *mut ScSession, stream: c_int) -> c_int {
    let Some(s) = s.as_mut() else {
        return -1;
    };
    status(stream_from_c(stream).and_then(|st| s.device.enable_stream(st)))
}

/// Enable IMU compensation before opening.
/// `mode`: bit 0 = scale/assembly, bit 1 = temperature drift.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_enable_process_mode(s: *mut ScSession, mode: u32) -> c_int {
    let Some(s) = s.as_mut() else {
        return -1;
    };
    status(s.device.enable_process_mode(ProcessMode::from_bits_truncate(mode)))
}

/// Open the session. `params` may be null for defaults.
/// Returns 0 on success, -1 on error (check sc_last_error()).
///
/// # Safety
/// `s` must be a valid session pointer, or null. `params` must point to a
/// valid `ScOpenParams`, or be null.
#[no_mangle]
pub unsafe extern "C" fn sc_open(s: *mut ScSession, params: *const ScOpenParams) -> c_int {
    let Some(s) = s.as_mut() else {
        return -1;
    };
    let params = match params.as_ref() {
        Some(p) => open_params_from_c(p),
        None => Ok(OpenParams::default()),
    };
    status(params.and_then(|p| s.device.open(p)))
}

/// Stop the pipeline. The session can be opened again.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_close(s: *mut ScSession) {
    if let Some(s) = s.as_mut() {
        s.device.close();
        s.imu.clear();
    }
}

/// Submit one raw frame. The pixel data is copied.
/// `kind`: 0 = color, 1 = depth. `format`: numeric `PixelFormat`.
///
/// # Safety
/// `s` must be a valid session pointer, or null. `data` must point to at
/// least `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn sc_submit_frame(
    s: *const ScSession,
    kind: c_int,
    frame_id: u16,
    width: u32,
    height: u32,
    format: c_int,
    data: *const u8,
    len: usize,
) -> c_int {
    let Some(s) = s.as_ref() else {
        return -1;
    };
    if data.is_null() {
        return status(Err(StereoCamError::InvalidArgument("frame data")));
    }
    let result = kind_from_c(kind).and_then(|kind| {
        let format = format_from_c(format)?;
        let pixels = std::slice::from_raw_parts(data, len).to_vec();
        s.backend
            .submit_frame(kind, RawFrame::new(frame_id, width, height, format, pixels));
        Ok(())
    });
    status(result)
}

/// Submit one raw IMU segment. `flag`: 1 = accelerometer, 2 = gyroscope.
/// Returns 0 when forwarded, -1 when the side channel is not running.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_push_imu_segment(
    s: *const ScSession,
    flag: u8,
    timestamp: u64,
    temperature: i16,
    x: i16,
    y: i16,
    z: i16,
) -> c_int {
    let Some(s) = s.as_ref() else {
        return -1;
    };
    let packet = ImuPacket {
        segments: vec![ImuSegment {
            flag,
            timestamp,
            temperature,
            accel_or_gyro: [x, y, z],
        }],
    };
    if s.backend.push_imu(&packet) {
        0
    } else {
        -1
    }
}

/// Submit the metadata of one frame.
/// Returns 0 when forwarded, -1 when the side channel is not running.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_push_metadata(
    s: *const ScSession,
    frame_id: u16,
    timestamp: u32,
    exposure_time: u16,
) -> c_int {
    let Some(s) = s.as_ref() else {
        return -1;
    };
    let packet = MetadataPacket {
        frame_id,
        timestamp,
        exposure_time,
    };
    if s.backend.push_metadata(packet) {
        0
    } else {
        -1
    }
}

/// Take the newest image of a stream, discarding older ones.
///
/// Writes the description to `info` and the pixels to `buf`. Returns 1
/// when an image was written, 0 when none was buffered, -1 on error. When
/// `cap` is too small, `info->size` holds the needed size and the image is
/// lost.
///
/// # Safety
/// `s` must be a valid session pointer, or null. `info` must be a valid
/// pointer. `buf` must point to at least `cap` writable bytes, or be null
/// with `cap` 0.
#[no_mangle]
pub unsafe extern "C" fn sc_retrieve_latest(
    s: *const ScSession,
    stream: c_int,
    info: *mut ScImage,
    buf: *mut u8,
    cap: usize,
) -> c_int {
    let Some(s) = s.as_ref() else {
        return -1;
    };
    if info.is_null() {
        return status(Err(StereoCamError::InvalidArgument("image info")));
    }

    let sample = match stream_from_c(stream).and_then(|st| s.device.retrieve_latest(st)) {
        Ok(Some(sample)) => sample,
        Ok(None) => return 0,
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    };

    let image = &sample.image;
    info.write(ScImage {
        frame_id: image.frame_id,
        width: image.width,
        height: image.height,
        format: image.format,
        size: image.data.len(),
        has_metadata: sample.metadata.is_some(),
        metadata: sample.metadata.unwrap_or_default(),
    });

    if buf.is_null() || cap < image.data.len() {
        set_last_error(&StereoCamError::BufferTooSmall {
            needed: image.data.len(),
            capacity: cap,
        });
        return -1;
    }
    std::ptr::copy_nonoverlapping(image.data.as_ptr(), buf, image.data.len());
    1
}

/// Copy up to `max` IMU samples, oldest first, into `out`.
/// Samples that do not fit are kept for the next call.
/// Returns the number written, or -1 on error.
///
/// # Safety
/// `s` must be a valid session pointer, or null. `out` must point to an
/// array of at least `max` `ImuSample` elements.
#[no_mangle]
pub unsafe extern "C" fn sc_retrieve_imu(s: *mut ScSession, out: *mut ImuSample, max: usize) -> c_int {
    let Some(s) = s.as_mut() else {
        return -1;
    };
    if out.is_null() {
        return status(Err(StereoCamError::InvalidArgument("imu output")));
    }

    match s.device.retrieve_imu_batch() {
        Ok(batch) => s.imu.extend(batch),
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    }

    let count = s.imu.len().min(max).min(c_int::MAX as usize);
    for (i, sample) in s.imu.drain(..count).enumerate() {
        out.add(i).write(sample);
    }
    count as c_int
}

/// Sleep to keep the caller's loop at the open frame rate.
///
/// # Safety
/// `s` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_wait(s: *const ScSession) {
    if let Some(s) = s.as_ref() {
        s.device.wait();
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next stereocam API call.
#[no_mangle]
pub extern "C" fn sc_last_error() -> *const c_char {
    LAST_ERROR.with(LastError::as_ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::time::{Duration, Instant};

    fn empty_image() -> ScImage {
        ScImage {
            frame_id: 0,
            width: 0,
            height: 0,
            format: PixelFormat::Gray8,
            size: 0,
            has_metadata: false,
            metadata: FrameMetadata::default(),
        }
    }

    #[test]
    fn test_session_roundtrip() {
        unsafe {
            let s = sc_session_new(true);
            assert_eq!(sc_enable_stream(s, 0), 0);
            assert_eq!(sc_enable_stream(s, 9), -1);
            assert!(!sc_last_error().is_null());
            assert_eq!(sc_open(s, std::ptr::null()), 0);

            let pixels = [10u8, 11, 12, 13];
            assert_eq!(sc_submit_frame(s, 0, 3, 4, 1, 4, pixels.as_ptr(), pixels.len()), 0);
            assert_eq!(sc_push_metadata(s, 3, 300, 8), 0);

            let mut info = empty_image();
            let mut buf = [0u8; 16];
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut got = 0;
            while got == 0 && Instant::now() < deadline {
                got = sc_retrieve_latest(s, 0, &mut info, buf.as_mut_ptr(), buf.len());
                std::thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(got, 1);
            assert_eq!(info.frame_id, 3);
            assert_eq!(info.size, 4);
            assert!(info.has_metadata);
            assert_eq!(info.metadata.timestamp, 300);
            assert_eq!(&buf[..4], &pixels);

            assert_eq!(sc_retrieve_latest(s, 2, &mut info, buf.as_mut_ptr(), buf.len()), -1);
            let msg = CStr::from_ptr(sc_last_error()).to_str().unwrap();
            assert!(msg.contains("disabled"));

            sc_close(s);
            sc_session_free(s);
        }
    }

    #[test]
    fn test_imu_kept_across_calls() {
        unsafe {
            let s = sc_session_new(true);
            assert_eq!(sc_open(s, std::ptr::null()), 0);
            for i in 0..25 {
                assert_eq!(sc_push_imu_segment(s, 2, i, 16, 0, 0, 16384), 0);
            }

            let mut out = [ImuSample {
                flag: crate::types::ImuFlag::Accel,
                timestamp: 0,
                temperature: 0.0,
                accel: [0.0; 3],
                gyro: [0.0; 3],
            }; 10];
            assert_eq!(sc_retrieve_imu(s, out.as_mut_ptr(), out.len()), 10);
            assert_eq!(out[0].timestamp, 0);
            assert_eq!(out[0].temperature, 25.0);
            assert_eq!(sc_retrieve_imu(s, out.as_mut_ptr(), out.len()), 10);
            assert_eq!(out[0].timestamp, 10);
            assert_eq!(sc_retrieve_imu(s, out.as_mut_ptr(), out.len()), 5);
            assert_eq!(sc_retrieve_imu(s, out.as_mut_ptr(), out.len()), 0);

            sc_session_free(s);
        }
    }

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(sc_open(std::ptr::null_mut(), std::ptr::null()), -1);
            assert_eq!(sc_push_metadata(std::ptr::null(), 1, 1, 1), -1);
            sc_close(std::ptr::null_mut());
            sc_session_free(std::ptr::null_mut());
        }
    }
}
