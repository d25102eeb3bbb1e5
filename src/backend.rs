//! Boundary to the vendor hardware layer.
//!
//! A [`Backend`] delivers raw frames on demand and pushes IMU and frame
//! metadata packets into a [`SideChannelSink`] from its own thread.
//! [`PushBackend`] is an in-process implementation fed by the host.

use crate::config::OpenParams;
use crate::imu::ImuIngest;
use crate::protocol::{ImuPacket, MetadataPacket};
use crate::queue::StagingQueue;
use crate::types::{DeviceParams, Extrinsics, FrameKind, FrameMetadata, MotionIntrinsics, RawFrame, RectifyIndex};
use crate::{Result, StereoCamError};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Hardware abstraction consumed by [`Device`](crate::Device).
///
/// Every method may be called from the capture thread or the application
/// thread concurrently.
pub trait Backend: Send + Sync {
    /// Open the streams described by `params`.
    fn open(&self, params: &OpenParams) -> Result<()>;

    fn close(&self);

    /// Next frame of the given kind, owned by the caller, or `None` when
    /// nothing new arrived since the previous call.
    fn deliver_frame(&self, kind: FrameKind) -> Option<RawFrame>;

    /// Whether the IMU/metadata side channel exists on this device.
    fn side_channel_present(&self) -> bool;

    /// Start pushing side-channel packets into `sink`.
    fn start_side_channel(&self, sink: SideChannelSink) -> Result<()>;

    fn stop_side_channel(&self);

    /// IMU intrinsics and the left-camera-to-IMU extrinsics.
    fn load_calibration(&self) -> Option<(MotionIntrinsics, Extrinsics)>;

    fn device_params(&self) -> Option<DeviceParams> {
        None
    }

    /// Raw rectification record for one resolution.
    fn rectify_log(&self, _index: RectifyIndex) -> Option<Vec<u8>> {
        None
    }
}

/// Handle a backend pushes side-channel packets into.
///
/// Cheap to clone; holds no reference to pipeline state other than the
/// IMU ingest and the metadata channel.
#[derive(Clone)]
pub struct SideChannelSink {
    imu: Arc<ImuIngest>,
    metadata: Sender<FrameMetadata>,
    color_ready: Arc<StagingQueue<RawFrame>>,
}

impl SideChannelSink {
    pub(crate) fn new(
        imu: Arc<ImuIngest>,
        metadata: Sender<FrameMetadata>,
        color_ready: Arc<StagingQueue<RawFrame>>,
    ) -> Self {
        Self {
            imu,
            metadata,
            color_ready,
        }
    }

    /// Compensate and buffer the samples of one IMU packet.
    pub fn on_imu(&self, packet: &ImuPacket) {
        self.imu.on_packet(packet);
    }

    /// Queue one metadata record for matching.
    pub fn on_metadata(&self, packet: MetadataPacket) {
        match self.metadata.try_send(packet.into()) {
            Ok(()) => self.color_ready.notify_all(),
            Err(TrySendError::Full(_)) => {
                log::trace!("Metadata channel full, dropping frame {}", packet.frame_id);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Metadata channel closed, dropping frame {}", packet.frame_id);
            }
        }
    }
}

/// Frames a [`PushBackend`] keeps per kind before dropping the oldest.
pub const PUSH_BACKEND_DEPTH: usize = 8;

/// Backend fed by the host process.
///
/// Frames submitted with [`submit_frame`](PushBackend::submit_frame) are
/// handed to the capture thread in order; side-channel packets are
/// forwarded to the sink while the side channel runs.
pub struct PushBackend {
    color: Mutex<VecDeque<RawFrame>>,
    depth: Mutex<VecDeque<RawFrame>>,
    side_channel: bool,
    sink: Mutex<Option<SideChannelSink>>,
    calibration: Option<(MotionIntrinsics, Extrinsics)>,
    params: Option<DeviceParams>,
    rectify: [Option<Vec<u8>>; 2],
    opened: AtomicBool,
}

impl PushBackend {
    /// A backend with a side channel and no calibration.
    pub fn new() -> Self {
        Self {
            color: Mutex::new(VecDeque::new()),
            depth: Mutex::new(VecDeque::new()),
            side_channel: true,
            sink: Mutex::new(None),
            calibration: None,
            params: None,
            rectify: [None, None],
            opened: AtomicBool::new(false),
        }
    }

    /// Simulate a device without IMU/metadata side channel.
    pub fn without_side_channel(mut self) -> Self {
        self.side_channel = false;
        self
    }

    pub fn with_calibration(mut self, intrinsics: MotionIntrinsics, extrinsics: Extrinsics) -> Self {
        self.calibration = Some((intrinsics, extrinsics));
        self
    }

    pub fn with_device_params(mut self, params: DeviceParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_rectify_log(mut self, index: RectifyIndex, blob: Vec<u8>) -> Self {
        self.rectify[index as usize] = Some(blob);
        self
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    fn slot(&self, kind: FrameKind) -> &Mutex<VecDeque<RawFrame>> {
        match kind {
            FrameKind::Color => &self.color,
            FrameKind::Depth => &self.depth,
        }
    }

    /// Hand a frame to the capture thread.
    pub fn submit_frame(&self, kind: FrameKind, frame: RawFrame) {
        let mut slot = self.slot(kind).lock().unwrap_or_else(|e| e.into_inner());
        slot.push_back(frame);
        if slot.len() > PUSH_BACKEND_DEPTH {
            if let Some(old) = slot.pop_front() {
                log::trace!("{:?} frame {} not captured in time, dropped", kind, old.frame_id);
            }
        }
    }

    /// Frames of `kind` submitted but not yet captured.
    pub fn queued(&self, kind: FrameKind) -> usize {
        self.slot(kind).lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn with_sink(&self, f: impl FnOnce(&SideChannelSink)) -> bool {
        match self.sink.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(sink) => {
                f(sink);
                true
            }
            None => false,
        }
    }

    /// Forward an IMU packet. Returns `false` when the side channel is not running.
    pub fn push_imu(&self, packet: &ImuPacket) -> bool {
        self.with_sink(|sink| sink.on_imu(packet))
    }

    /// Forward a metadata record. Returns `false` when the side channel is not running.
    pub fn push_metadata(&self, packet: MetadataPacket) -> bool {
        self.with_sink(|sink| sink.on_metadata(packet))
    }
}

impl Default for PushBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PushBackend {
    fn open(&self, params: &OpenParams) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(StereoCamError::Backend("push backend already opened".into()));
        }
        let (w, h) = params.stream_mode.size();
        log::debug!("Push backend opened at {}x{} {} fps", w, h, params.effective_framerate());
        Ok(())
    }

    fn close(&self) {
        self.opened.store(false, Ordering::Release);
        for kind in [FrameKind::Color, FrameKind::Depth] {
            self.slot(kind).lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    fn deliver_frame(&self, kind: FrameKind) -> Option<RawFrame> {
        self.slot(kind).lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    fn side_channel_present(&self) -> bool {
        self.side_channel
    }

    fn start_side_channel(&self, sink: SideChannelSink) -> Result<()> {
        if !self.side_channel {
            return Err(StereoCamError::ImuOpenFailed);
        }
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        Ok(())
    }

    fn stop_side_channel(&self) {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn load_calibration(&self) -> Option<(MotionIntrinsics, Extrinsics)> {
        self.calibration
    }

    fn device_params(&self) -> Option<DeviceParams> {
        self.params.clone()
    }

    fn rectify_log(&self, index: RectifyIndex) -> Option<Vec<u8>> {
        self.rectify[index as usize].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ImuSegment;
    use crate::types::{PixelFormat, ProcessMode};

    fn frame(id: u16) -> RawFrame {
        RawFrame::new(id, 2, 1, PixelFormat::Gray8, vec![0, 0])
    }

    #[test]
    fn test_frames_delivered_in_order() {
        let b = PushBackend::new();
        assert!(b.deliver_frame(FrameKind::Color).is_none());
        b.submit_frame(FrameKind::Color, frame(1));
        b.submit_frame(FrameKind::Color, frame(2));
        b.submit_frame(FrameKind::Depth, frame(9));
        assert_eq!(b.queued(FrameKind::Color), 2);
        assert_eq!(b.deliver_frame(FrameKind::Color).unwrap().frame_id, 1);
        assert_eq!(b.deliver_frame(FrameKind::Color).unwrap().frame_id, 2);
        assert_eq!(b.deliver_frame(FrameKind::Depth).unwrap().frame_id, 9);
    }

    #[test]
    fn test_oldest_frame_dropped_when_full() {
        let b = PushBackend::new();
        for id in 0..(PUSH_BACKEND_DEPTH as u16 + 3) {
            b.submit_frame(FrameKind::Depth, frame(id));
        }
        assert_eq!(b.queued(FrameKind::Depth), PUSH_BACKEND_DEPTH);
        assert_eq!(b.deliver_frame(FrameKind::Depth).unwrap().frame_id, 3);
    }

    #[test]
    fn test_side_channel_forwarding() {
        let b = PushBackend::new();
        let packet = ImuPacket {
            segments: vec![ImuSegment {
                flag: 2,
                timestamp: 1,
                temperature: 0,
                accel_or_gyro: [1, 2, 3],
            }],
        };
        let meta = MetadataPacket {
            frame_id: 4,
            timestamp: 40,
            exposure_time: 3,
        };
        assert!(!b.push_imu(&packet));
        assert!(!b.push_metadata(meta));

        let imu = Arc::new(ImuIngest::new(ProcessMode::empty(), None, 0, None));
        let (tx, rx) = crossbeam_channel::bounded(4);
        let staging = Arc::new(StagingQueue::new());
        b.start_side_channel(SideChannelSink::new(imu.clone(), tx, staging))
            .unwrap();

        assert!(b.push_imu(&packet));
        assert!(b.push_metadata(meta));
        assert_eq!(imu.drain().len(), 1);
        assert_eq!(rx.try_recv().unwrap().frame_id, 4);

        b.stop_side_channel();
        assert!(!b.push_metadata(meta));
    }

    #[test]
    fn test_metadata_dropped_when_channel_full() {
        let imu = Arc::new(ImuIngest::new(ProcessMode::empty(), None, 0, None));
        let (tx, rx) = crossbeam_channel::bounded(2);
        let sink = SideChannelSink::new(imu, tx, Arc::new(StagingQueue::new()));
        for id in 0..5 {
            sink.on_metadata(MetadataPacket {
                frame_id: id,
                timestamp: 0,
                exposure_time: 0,
            });
        }
        let ids: Vec<u16> = rx.try_iter().map(|m| m.frame_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_no_side_channel_fails_start() {
        let b = PushBackend::new().without_side_channel();
        assert!(!b.side_channel_present());
        let imu = Arc::new(ImuIngest::new(ProcessMode::empty(), None, 0, None));
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let sink = SideChannelSink::new(imu, tx, Arc::new(StagingQueue::new()));
        assert!(matches!(b.start_side_channel(sink), Err(StereoCamError::ImuOpenFailed)));
    }

    #[test]
    fn test_double_open_rejected() {
        let b = PushBackend::new();
        b.open(&OpenParams::default()).unwrap();
        assert!(b.open(&OpenParams::default()).is_err());
        b.close();
        assert!(!b.is_opened());
        b.open(&OpenParams::default()).unwrap();
    }
}
