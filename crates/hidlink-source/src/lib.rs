//! hidlink-source: frame sources for the streaming pipeline.
//!
//! | Source | Backing | Frame type | Restart per cycle |
//! |--------|---------|------------|-------------------|
//! | [`DirectoryImageSource`] | image files in a folder | `Image` / `Jpeg` by extension | replays cached listing |
//! | [`VideoFrameSource`] | media file + [`VideoDecoder`] | `Jpeg` | re-runs the decoder |
//! | [`MemoryFrameSource`] | pre-rendered payloads | caller's choice | replays the list |
//!
//! Every source checks that it has something to play when it is opened and
//! fails with `HidLinkError::SourceUnavailable` otherwise, before any device
//! is touched.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{FrameOrigin, FrameType, HidLinkError};

pub mod directory;
pub mod memory;
pub mod video;

#[cfg(feature = "gstreamer")]
pub mod gst;

pub use directory::{DirectoryImageSource, SUPPORTED_EXTENSIONS};
pub use memory::MemoryFrameSource;
pub use video::{DecodedJpeg, VideoDecoder, VideoFrameSource};

#[cfg(feature = "gstreamer")]
pub use gst::GstJpegDecoder;

// ── SourceFrame ───────────────────────────────────────────────────────────────

/// One frame payload as produced by a source, before it gets a transfer id.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub payload: Bytes,
    pub frame_type: FrameType,
    /// Presentation timestamp within the pass, when the source knows it.
    pub timestamp: Option<Duration>,
    pub origin: FrameOrigin,
}

// ── FrameSource trait ─────────────────────────────────────────────────────────

/// Lazy, ordered sequence of frames, replayable in whole passes.
#[async_trait]
pub trait FrameSource: Send {
    /// Position the source at its first frame. Called before every pass,
    /// the first one included.
    async fn begin_pass(&mut self) -> Result<(), HidLinkError>;

    /// Next frame of the current pass; `None` at the end of the pass.
    async fn next_frame(&mut self) -> Result<Option<SourceFrame>, HidLinkError>;

    /// Nominal spacing between frames, if the source has a frame rate.
    fn frame_interval(&self) -> Option<Duration> {
        None
    }

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    async fn begin_pass(&mut self) -> Result<(), HidLinkError> {
        (**self).begin_pass().await
    }

    async fn next_frame(&mut self) -> Result<Option<SourceFrame>, HidLinkError> {
        (**self).next_frame().await
    }

    fn frame_interval(&self) -> Option<Duration> {
        (**self).frame_interval()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
