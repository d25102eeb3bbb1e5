use crate::calibration;
use crate::protocol::{self, ImuPacket};
use crate::queue::ResultQueue;
use crate::types::{ImuSample, MotionIntrinsics, ProcessMode};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Batch {
    count: u64,
    pending: Vec<ImuSample>,
}

/// Compensates IMU samples as they arrive and commits them to the
/// consumer-facing queue.
///
/// Samples stay in a private buffer until more than `batch_threshold` have
/// arrived since the last [`reset`](ImuIngest::reset); from then on every
/// sample is committed as it comes in.
pub struct ImuIngest {
    mode: ProcessMode,
    model: Option<Arc<MotionIntrinsics>>,
    batch_threshold: u64,
    batch: Mutex<Batch>,
    output: ResultQueue<ImuSample>,
}

impl ImuIngest {
    pub fn new(
        mode: ProcessMode,
        model: Option<Arc<MotionIntrinsics>>,
        batch_threshold: u64,
        queue_cap: Option<usize>,
    ) -> Self {
        if model.is_none() && !mode.is_empty() {
            log::warn!("IMU process mode {:?} set without calibration, samples pass through", mode);
        }
        Self {
            mode,
            model,
            batch_threshold,
            batch: Mutex::new(Batch::default()),
            output: ResultQueue::new(queue_cap),
        }
    }

    /// Handle one side-channel packet.
    pub fn on_packet(&self, packet: &ImuPacket) {
        let mut batch = self.batch.lock().unwrap_or_else(|e| e.into_inner());
        for seg in &packet.segments {
            let Some(raw) = protocol::parse_imu_segment(seg) else {
                log::debug!("Skipping IMU segment with unknown flag {}", seg.flag);
                continue;
            };
            let sample = calibration::compensate(&raw, self.mode, self.model.as_deref());

            batch.count = batch.count.saturating_add(1);
            batch.pending.push(sample);
            if batch.count > self.batch_threshold {
                let dropped = self.output.push_all(batch.pending.drain(..));
                if dropped > 0 {
                    log::debug!("IMU queue overflow, dropped {} samples", dropped);
                }
            }
        }
    }

    /// Move out every committed sample.
    pub fn drain(&self) -> Vec<ImuSample> {
        self.output.drain_all()
    }

    /// Samples received but not yet committed.
    pub fn pending(&self) -> usize {
        self.batch.lock().unwrap_or_else(|e| e.into_inner()).pending.len()
    }
}
