//! Frame synthesis: pairs color frames with side-channel metadata, splits
//! stereo composites and publishes the results to the consumer queues.
//!
//! One cycle takes everything staged since the previous cycle:
//! 1. nothing happens while either frames or metadata are missing;
//! 2. when all metadata is older than every frame, the metadata is dropped
//!    (and the frames too once more than `resync_backlog` piled up), and
//!    symmetrically when all frames are older than every metadata record;
//! 3. otherwise each frame is published with the metadata of the same
//!    frame id, and everything left unmatched is dropped.
//!
//! Frame ids wrap at 16 bits, so "older" uses serial-number arithmetic.

use crate::capture::Staging;
use crate::config::PipelineConfig;
use crate::queue::ResultQueue;
use crate::types::{FrameMetadata, RawFrame, StereoHalf, StreamSample, StreamType, Streams};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether frame id `a` was issued after `b`, tolerating 16-bit wraparound.
pub fn frame_id_after(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) > 0
}

/// Consumer-facing image queues.
pub(crate) struct Outputs {
    pub left: ResultQueue<StreamSample>,
    pub right: ResultQueue<StreamSample>,
    pub depth: ResultQueue<StreamSample>,
}

impl Outputs {
    pub fn new(cap: usize) -> Self {
        Self {
            left: ResultQueue::new(Some(cap)),
            right: ResultQueue::new(Some(cap)),
            depth: ResultQueue::new(Some(cap)),
        }
    }

    pub fn get(&self, stream: StreamType) -> &ResultQueue<StreamSample> {
        match stream {
            StreamType::LeftColor => &self.left,
            StreamType::RightColor => &self.right,
            StreamType::Depth => &self.depth,
        }
    }
}

/// Matching state carried from one synthesis cycle to the next.
pub(crate) struct Synthesizer {
    streams: Streams,
    split: bool,
    side_channel: bool,
    cap: usize,
    resync_backlog: usize,
    frames: Vec<RawFrame>,
    metadata: Vec<FrameMetadata>,
}

impl Synthesizer {
    pub fn new(streams: Streams, side_channel: bool, cap: usize, resync_backlog: usize) -> Self {
        Self {
            streams,
            split: streams.contains(Streams::RIGHT_COLOR),
            side_channel,
            cap,
            resync_backlog,
            frames: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Run one color cycle over newly staged frames and metadata.
    pub fn color_cycle(
        &mut self,
        staged: Vec<RawFrame>,
        metadata: impl IntoIterator<Item = FrameMetadata>,
        out: &Outputs,
    ) {
        if !self.side_channel {
            let samples = staged.into_iter().map(|frame| (frame, None));
            self.publish_color(samples, out);
            return;
        }

        self.frames.extend(staged);
        self.metadata.extend(metadata);

        if self.frames.is_empty() || self.metadata.is_empty() {
            self.bound_unpaired();
            return;
        }

        if self.resync() {
            return;
        }

        let frames = std::mem::take(&mut self.frames);
        let metadata = std::mem::take(&mut self.metadata);
        let total = frames.len();
        let matched: Vec<_> = frames
            .into_iter()
            .filter_map(|frame| {
                let info = metadata.iter().find(|m| m.frame_id == frame.frame_id)?;
                Some((frame, Some(*info)))
            })
            .collect();

        if matched.len() < total {
            log::trace!("{} of {} color frames unmatched, dropped", total - matched.len(), total);
        }
        self.publish_color(matched.into_iter(), out);
    }

    /// Drop one side of a desync. Returns `true` when the cycle is done.
    fn resync(&mut self) -> bool {
        let (Some(first_frame), Some(last_frame)) = (self.frames.first(), self.frames.last()) else {
            return false;
        };
        let (Some(first_meta), Some(last_meta)) = (self.metadata.first(), self.metadata.last()) else {
            return false;
        };

        if frame_id_after(first_frame.frame_id, last_meta.frame_id) {
            log::debug!(
                "Metadata behind frames (frame {} > metadata {}), dropping {} metadata",
                first_frame.frame_id,
                last_meta.frame_id,
                self.metadata.len()
            );
            if self.frames.len() > self.resync_backlog {
                log::debug!("Frame backlog {} over limit, dropping frames", self.frames.len());
                self.frames.clear();
            }
            self.metadata.clear();
            true
        } else if frame_id_after(first_meta.frame_id, last_frame.frame_id) {
            log::debug!(
                "Frames behind metadata (metadata {} > frame {}), dropping {} frames",
                first_meta.frame_id,
                last_frame.frame_id,
                self.frames.len()
            );
            if self.metadata.len() > self.resync_backlog {
                log::debug!("Metadata backlog {} over limit, dropping metadata", self.metadata.len());
                self.metadata.clear();
            }
            self.frames.clear();
            true
        } else {
            false
        }
    }

    /// Keep frames waiting for metadata (or the reverse) from growing past
    /// the queue cap.
    fn bound_unpaired(&mut self) {
        if self.frames.len() > self.cap {
            log::warn!("No metadata for {} color frames, dropping them", self.frames.len());
            self.frames.clear();
        }
        if self.metadata.len() > self.cap {
            log::warn!("No color frames for {} metadata records, dropping them", self.metadata.len());
            self.metadata.clear();
        }
    }

    fn publish_color(
        &self,
        samples: impl Iterator<Item = (RawFrame, Option<FrameMetadata>)>,
        out: &Outputs,
    ) {
        let mut left = Vec::new();
        let mut right = Vec::new();

        for (frame, metadata) in samples {
            if !self.split {
                left.push(StreamSample { image: frame, metadata });
                continue;
            }
            match (frame.half(StereoHalf::Left), frame.half(StereoHalf::Right)) {
                (Some(l), Some(r)) => {
                    left.push(StreamSample { image: l, metadata });
                    right.push(StreamSample { image: r, metadata });
                }
                _ => log::warn!(
                    "Cannot split color frame {} ({:?} {}x{}, {} bytes)",
                    frame.frame_id,
                    frame.format,
                    frame.width,
                    frame.height,
                    frame.data.len()
                ),
            }
        }

        Self::commit(&out.left, StreamType::LeftColor, left);
        if self.split {
            Self::commit(&out.right, StreamType::RightColor, right);
        }
    }

    /// Publish depth frames; depth has no metadata to match.
    pub fn depth_cycle(&self, staged: Vec<RawFrame>, out: &Outputs) {
        let samples = staged
            .into_iter()
            .map(|image| StreamSample { image, metadata: None })
            .collect();
        Self::commit(&out.depth, StreamType::Depth, samples);
    }

    fn commit(queue: &ResultQueue<StreamSample>, stream: StreamType, samples: Vec<StreamSample>) {
        if samples.is_empty() {
            return;
        }
        let dropped = queue.push_all(samples);
        if dropped > 0 {
            log::debug!("{:?} queue over {:?}, dropped {} samples", stream, queue.cap(), dropped);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> (usize, usize) {
        (self.frames.len(), self.metadata.len())
    }
}

/// Body of the synthesis thread.
pub(crate) fn synthesis_loop(
    mut synth: Synthesizer,
    staging: Arc<Staging>,
    metadata: Option<Receiver<FrameMetadata>>,
    outputs: Arc<Outputs>,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
) {
    let streams = synth.streams;
    log::info!("Synthesis started (metadata matching {})", if metadata.is_some() { "on" } else { "off" });

    while running.load(Ordering::Acquire) {
        if streams.wants_color() {
            let staged = staging.color.wait_take(config.synthesis_timeout);
            let records: Vec<FrameMetadata> = match &metadata {
                Some(rx) => rx.try_iter().collect(),
                None => Vec::new(),
            };
            synth.color_cycle(staged, records, &outputs);
        }
        if streams.contains(Streams::DEPTH) {
            let staged = staging.depth.wait_take(config.synthesis_timeout);
            synth.depth_cycle(staged, &outputs);
        }
        std::thread::sleep(config.synthesis_interval);
    }

    log::info!("Synthesis stopped");
}
