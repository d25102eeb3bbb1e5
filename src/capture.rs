use crate::backend::Backend;
use crate::queue::StagingQueue;
use crate::types::{FrameKind, RawFrame, Streams};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Frames captured but not yet seen by the synthesizer, one list per
/// hardware stream.
#[derive(Default)]
pub(crate) struct Staging {
    pub color: Arc<StagingQueue<RawFrame>>,
    pub depth: StagingQueue<RawFrame>,
}

impl Staging {
    pub fn get(&self, kind: FrameKind) -> &StagingQueue<RawFrame> {
        match kind {
            FrameKind::Color => &self.color,
            FrameKind::Depth => &self.depth,
        }
    }

    /// Release a synthesizer blocked on either list.
    pub fn wake_all(&self) {
        self.color.notify_all();
        self.depth.notify_all();
    }
}

/// Poll the backend once for every enabled hardware stream.
/// Returns how many frames were staged.
pub(crate) fn capture_once(backend: &dyn Backend, streams: Streams, staging: &Staging) -> usize {
    let mut kinds = Vec::with_capacity(2);
    if streams.wants_color() {
        kinds.push(FrameKind::Color);
    }
    if streams.contains(Streams::DEPTH) {
        kinds.push(FrameKind::Depth);
    }

    let mut staged = 0;
    for kind in kinds {
        if let Some(frame) = backend.deliver_frame(kind) {
            log::trace!("Captured {:?} frame {}", kind, frame.frame_id);
            staging.get(kind).push(frame);
            staged += 1;
        }
    }
    staged
}

/// Body of the capture thread.
pub(crate) fn capture_loop(
    backend: Arc<dyn Backend>,
    streams: Streams,
    staging: Arc<Staging>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    log::info!("Capture started for {:?}", streams);
    let mut total: u64 = 0;

    while running.load(Ordering::Acquire) {
        total += capture_once(backend.as_ref(), streams, &staging) as u64;
        std::thread::sleep(interval);
    }

    log::info!("Capture stopped after {} frames", total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PushBackend;
    use crate::types::PixelFormat;

    fn frame(id: u16) -> RawFrame {
        RawFrame::new(id, 2, 1, PixelFormat::Gray8, vec![1, 2])
    }

    #[test]
    fn test_capture_once_respects_streams() {
        let backend = PushBackend::new();
        let staging = Staging::default();
        backend.submit_frame(FrameKind::Color, frame(1));
        backend.submit_frame(FrameKind::Depth, frame(2));

        assert_eq!(capture_once(&backend, Streams::DEPTH, &staging), 1);
        assert_eq!(staging.depth.wait_take(Duration::ZERO)[0].frame_id, 2);
        assert_eq!(staging.color.len(), 0);
        assert_eq!(backend.queued(FrameKind::Color), 1);

        assert_eq!(capture_once(&backend, Streams::RIGHT_COLOR, &staging), 1);
        assert_eq!(staging.color.wait_take(Duration::ZERO)[0].frame_id, 1);

        assert_eq!(capture_once(&backend, Streams::ALL, &staging), 0);
    }
}
