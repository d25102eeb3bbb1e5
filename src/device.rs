use crate::backend::{Backend, SideChannelSink};
use crate::capture::{self, Staging};
use crate::config::{OpenParams, PipelineConfig, MAX_FRAMERATE, MAX_FRAMERATE_COMPOSITE};
use crate::imu::ImuIngest;
use crate::protocol::{self, RectifyLogData, RectifyLogLayout};
use crate::rate::Rate;
use crate::synthesis::{self, Outputs, Synthesizer};
use crate::types::{
    DeviceParams, Extrinsics, FrameMetadata, ImuSample, MotionIntrinsics, ProcessMode,
    RectifyIndex, StreamFormat, StreamMode, StreamSample, StreamType, Streams,
};
use crate::worker::Worker;
use crate::{Result, StereoCamError};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};

/// State that only exists between `open` and `close`.
struct Session {
    params: OpenParams,
    side_channel: bool,
    intrinsics: Option<Arc<MotionIntrinsics>>,
    extrinsics: Option<Extrinsics>,
    device_params: Option<DeviceParams>,
    rectify: [Option<RectifyLogData>; 2],
    staging: Arc<Staging>,
    outputs: Arc<Outputs>,
    imu: Arc<ImuIngest>,
    metadata: Option<Receiver<FrameMetadata>>,
    capture: Option<Worker>,
    synthesis: Option<Worker>,
}

/// A stereo camera session.
///
/// Streams and IMU processing are chosen before [`open`](Device::open);
/// opening loads calibration and device info, starts the side channel and
/// spawns the capture and synthesis threads. Results are pulled with the
/// `retrieve_*` methods.
pub struct Device {
    backend: Arc<dyn Backend>,
    config: PipelineConfig,
    streams: Streams,
    process_mode: ProcessMode,
    rate: Mutex<Rate>,
    session: Option<Session>,
}

impl Device {
    pub fn new(backend: Arc<dyn Backend>, config: PipelineConfig) -> Device {
        Device {
            backend,
            config,
            streams: Streams::empty(),
            process_mode: ProcessMode::empty(),
            rate: Mutex::new(Rate::new(OpenParams::default().effective_framerate())),
            session: None,
        }
    }

    pub fn enable_stream(&mut self, stream: StreamType) -> Result<()> {
        if self.session.is_some() {
            return Err(StereoCamError::AlreadyOpened);
        }
        self.streams |= stream.flag();
        Ok(())
    }

    pub fn enable_all_streams(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(StereoCamError::AlreadyOpened);
        }
        self.streams = Streams::ALL;
        Ok(())
    }

    /// Select IMU compensation. Takes effect at the next open.
    pub fn enable_process_mode(&mut self, mode: ProcessMode) -> Result<()> {
        if self.session.is_some() {
            return Err(StereoCamError::AlreadyOpened);
        }
        self.process_mode |= mode;
        Ok(())
    }

    pub fn streams(&self) -> Streams {
        self.streams
    }

    pub fn process_mode(&self) -> ProcessMode {
        self.process_mode
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_opened(&self) -> bool {
        self.session.is_some()
    }

    fn validate(&self, mut params: OpenParams) -> Result<OpenParams> {
        if self.streams.contains(Streams::RIGHT_COLOR) {
            if params.color_stream_format == StreamFormat::Mjpg {
                return Err(StereoCamError::Unsupported(
                    "right color stream needs an uncompressed color format".into(),
                ));
            }
            if params.stream_mode != StreamMode::Stream2560x720 {
                log::info!("Right color stream enabled, switching {:?} to 2560x720", params.stream_mode);
                params.stream_mode = StreamMode::Stream2560x720;
            }
        }

        let fps = params.effective_framerate();
        if fps > MAX_FRAMERATE {
            return Err(StereoCamError::Unsupported(format!(
                "frame rate {} above {}",
                fps, MAX_FRAMERATE
            )));
        }
        if params.stream_mode == StreamMode::Stream2560x720 && fps > MAX_FRAMERATE_COMPOSITE {
            return Err(StereoCamError::Unsupported(format!(
                "frame rate {} above {} in 2560x720",
                fps, MAX_FRAMERATE_COMPOSITE
            )));
        }
        Ok(params)
    }

    /// Open the device and start the pipeline.
    pub fn open(&mut self, params: OpenParams) -> Result<()> {
        if self.session.is_some() {
            return Err(StereoCamError::AlreadyOpened);
        }
        let params = self.validate(params)?;
        self.backend.open(&params)?;

        // Everything the threads read is loaded before any of them starts.
        let (intrinsics, extrinsics) = match self.backend.load_calibration() {
            Some((i, e)) => (Some(Arc::new(i)), Some(e)),
            None => {
                log::warn!("No IMU calibration on device, compensation disabled");
                (None, None)
            }
        };
        let device_params = self.backend.device_params();
        if let Some(p) = &device_params {
            log::info!(
                "Device: {} serial={} firmware={} hardware={}",
                p.name,
                p.serial_number,
                p.firmware_version,
                p.hardware_version
            );
        }
        let rectify = [RectifyIndex::Hd, RectifyIndex::Vga].map(|index| self.load_rectify_log(index));

        let imu = Arc::new(ImuIngest::new(
            self.process_mode,
            intrinsics.clone(),
            self.config.imu_batch_threshold,
            self.config.imu_queue_cap,
        ));
        let staging = Arc::new(Staging::default());

        let side_channel = self.backend.side_channel_present();
        let metadata = if side_channel {
            let (tx, rx) = crossbeam_channel::bounded(self.config.metadata_capacity);
            let sink = SideChannelSink::new(imu.clone(), tx, staging.color.clone());
            if let Err(e) = self.backend.start_side_channel(sink) {
                log::error!("Side channel failed to start: {}", e);
                self.backend.close();
                return Err(StereoCamError::ImuOpenFailed);
            }
            Some(rx)
        } else {
            log::warn!("No side channel, frames are delivered without metadata and no IMU data");
            None
        };

        *self.rate.lock().unwrap_or_else(|e| e.into_inner()) = Rate::new(params.effective_framerate());
        let (w, h) = params.stream_mode.size();
        log::info!("Opened device {} at {}x{} {} fps, streams {:?}", params.dev_index, w, h, params.effective_framerate(), self.streams);

        self.session = Some(Session {
            params,
            side_channel,
            intrinsics,
            extrinsics,
            device_params,
            rectify,
            staging,
            outputs: Arc::new(Outputs::new(self.config.image_queue_cap)),
            imu,
            metadata,
            capture: None,
            synthesis: None,
        });

        if self.streams.is_empty() {
            log::info!("No image stream enabled, capture not started");
            return Ok(());
        }
        let started = self.start_capture().and_then(|_| self.start_synthesis());
        if let Err(e) = started {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn load_rectify_log(&self, index: RectifyIndex) -> Option<RectifyLogData> {
        let blob = self.backend.rectify_log(index)?;
        match protocol::parse_rectify_log(&blob, RectifyLogLayout::V1) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!("Ignoring {:?} rectify log: {}", index, e);
                None
            }
        }
    }

    /// Stop the pipeline and close the device. Does nothing when not open.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session.side_channel {
            self.backend.stop_side_channel();
        }
        if let Some(mut w) = session.capture.take() {
            w.stop(|| {});
        }
        if let Some(mut w) = session.synthesis.take() {
            let staging = session.staging.clone();
            w.stop(move || staging.wake_all());
        }
        self.backend.close();
        log::info!("Closed device {}", session.params.dev_index);
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(StereoCamError::NotOpened)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(StereoCamError::NotOpened)
    }

    /// Parameters the device was opened with, after validation.
    pub fn open_params(&self) -> Option<&OpenParams> {
        self.session.as_ref().map(|s| &s.params)
    }

    pub fn device_params(&self) -> Option<&DeviceParams> {
        self.session.as_ref()?.device_params.as_ref()
    }

    pub fn motion_intrinsics(&self) -> Option<MotionIntrinsics> {
        let intrinsics = self.session.as_ref().and_then(|s| s.intrinsics.as_deref().copied());
        if intrinsics.is_none() {
            log::debug!("Motion intrinsics not loaded");
        }
        intrinsics
    }

    /// Left camera to IMU transform.
    pub fn motion_extrinsics(&self) -> Option<Extrinsics> {
        let extrinsics = self.session.as_ref().and_then(|s| s.extrinsics);
        if extrinsics.is_none() {
            log::debug!("Motion extrinsics not loaded");
        }
        extrinsics
    }

    pub fn rectify_log(&self, index: RectifyIndex) -> Option<&RectifyLogData> {
        self.session.as_ref()?.rectify[index as usize].as_ref()
    }

    pub fn is_side_channel_present(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.side_channel)
    }

    fn enabled_queue(&self, stream: StreamType) -> Result<&crate::queue::ResultQueue<StreamSample>> {
        let session = self.session()?;
        if !self.streams.contains(stream.flag()) {
            return Err(StereoCamError::StreamDisabled(stream));
        }
        Ok(session.outputs.get(stream))
    }

    /// Everything buffered for `stream`, oldest first.
    pub fn retrieve_all(&self, stream: StreamType) -> Result<Vec<StreamSample>> {
        Ok(self.enabled_queue(stream)?.drain_all())
    }

    /// Newest sample buffered for `stream`; older ones are discarded.
    pub fn retrieve_latest(&self, stream: StreamType) -> Result<Option<StreamSample>> {
        Ok(self.enabled_queue(stream)?.take_latest())
    }

    /// Every committed IMU sample, oldest first.
    pub fn retrieve_imu_batch(&self) -> Result<Vec<ImuSample>> {
        let session = self.session()?;
        if !session.side_channel {
            log::debug!("IMU requested without side channel");
            return Ok(Vec::new());
        }
        Ok(session.imu.drain())
    }

    /// Sleep to keep the caller's loop at the open frame rate.
    pub fn wait(&self) {
        self.rate.lock().unwrap_or_else(|e| e.into_inner()).sleep();
    }

    pub fn start_capture(&mut self) -> Result<()> {
        let backend = self.backend.clone();
        let streams = self.streams;
        let interval = self.config.capture_interval;
        let session = self.session_mut()?;
        if session.capture.as_ref().is_some_and(Worker::is_running) {
            return Ok(());
        }

        let staging = session.staging.clone();
        session.capture = Some(Worker::spawn("capture", move |running| {
            capture::capture_loop(backend, streams, staging, interval, running)
        })?);
        Ok(())
    }

    pub fn stop_capture(&mut self) {
        if let Some(mut w) = self.session.as_mut().and_then(|s| s.capture.take()) {
            w.stop(|| {});
        }
    }

    pub fn start_synthesis(&mut self) -> Result<()> {
        let streams = self.streams;
        let config = self.config.clone();
        let session = self.session_mut()?;
        if session.synthesis.as_ref().is_some_and(Worker::is_running) {
            return Ok(());
        }

        let synth = Synthesizer::new(
            streams,
            session.side_channel,
            config.image_queue_cap,
            config.resync_backlog,
        );
        let staging = session.staging.clone();
        let metadata = session.metadata.clone();
        let outputs = session.outputs.clone();
        session.synthesis = Some(Worker::spawn("synthesis", move |running| {
            synthesis::synthesis_loop(synth, staging, metadata, outputs, config, running)
        })?);
        Ok(())
    }

    pub fn stop_synthesis(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(mut w) = session.synthesis.take() {
            let staging = session.staging.clone();
            w.stop(move || staging.wake_all());
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}
