use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{FrameOrigin, FrameType, HidLinkError};

use crate::{FrameSource, SourceFrame};

/// Replays frames that are already in memory, such as canvas renders
/// produced by the design UI.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    frames: Vec<(String, Bytes, FrameType)>,
    interval: Option<Duration>,
    cursor: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<(String, Bytes, FrameType)>) -> Result<Self, HidLinkError> {
        if frames.is_empty() {
            return Err(HidLinkError::source_unavailable("<memory>", "no frames"));
        }
        Ok(Self { frames, interval: None, cursor: 0 })
    }

    /// `count` JPEG frames labelled `frame-0..`, each payload `size` bytes of its index.
    pub fn numbered(count: usize, size: usize) -> Result<Self, HidLinkError> {
        Self::new(
            (0..count)
                .map(|i| (format!("frame-{i}"), Bytes::from(vec![i as u8; size]), FrameType::Jpeg))
                .collect(),
        )
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn begin_pass(&mut self) -> Result<(), HidLinkError> {
        self.cursor = 0;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<SourceFrame>, HidLinkError> {
        let Some((label, payload, frame_type)) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        let timestamp = self.interval.map(|i| i * self.cursor as u32);
        self.cursor += 1;
        Ok(Some(SourceFrame {
            payload: payload.clone(),
            frame_type: *frame_type,
            timestamp,
            origin: FrameOrigin::Memory { label: label.clone() },
        }))
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.interval
    }

    fn describe(&self) -> String {
        format!("{} in-memory frame(s)", self.frames.len())
    }
}
