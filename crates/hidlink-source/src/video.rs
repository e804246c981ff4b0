//! Video file source: frames come from a [`VideoDecoder`] as JPEG payloads.
//!
//! Decoding is sequential, so a pass cannot be rewound halfway; every new
//! cycle restarts the decoder from the beginning of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{DecoderError, FrameOrigin, FrameType, HidLinkError};
use tracing::{debug, info};

use crate::{FrameSource, SourceFrame};

/// One decoded frame, already JPEG-encoded for the panel.
#[derive(Debug, Clone)]
pub struct DecodedJpeg {
    pub data: Bytes,
    pub pts: Option<Duration>,
}

// MARK: - VideoDecoder trait

/// Container decoding collaborator.
///
/// Implementações:
/// - `GstJpegDecoder`: GStreamer `decodebin ! jpegenc` (feature `gstreamer`)
#[async_trait]
pub trait VideoDecoder: Send {
    /// (Re)start decoding `path` from its first frame.
    async fn start(&mut self, path: &Path) -> Result<(), DecoderError>;

    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<DecodedJpeg>, DecoderError>;

    /// Output frame rate, when fixed or known.
    fn frame_rate(&self) -> Option<f64>;
}

// MARK: - VideoFrameSource

pub struct VideoFrameSource<D> {
    path: PathBuf,
    decoder: D,
    /// First frame, pulled by `open` to prove the file is playable.
    pending: Option<DecodedJpeg>,
    /// The decoder is still positioned on the pass started by `open`.
    fresh: bool,
    next_index: u64,
}

impl<D: VideoDecoder> VideoFrameSource<D> {
    /// Start decoding and pull the first frame; fails with `SourceUnavailable`
    /// if the file is missing or yields nothing.
    pub async fn open(path: impl Into<PathBuf>, mut decoder: D) -> Result<Self, HidLinkError> {
        let path = path.into();
        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(HidLinkError::source_unavailable(&path, "not a file"));
        }

        decoder
            .start(&path)
            .await
            .map_err(|e| HidLinkError::source_unavailable(&path, e.to_string()))?;
        let first = decoder
            .next_frame()
            .await
            .map_err(|e| HidLinkError::source_unavailable(&path, e.to_string()))?
            .ok_or_else(|| HidLinkError::source_unavailable(&path, "no decodable frames"))?;

        info!(
            "Video {} opened ({} fps)",
            path.display(),
            decoder.frame_rate().map_or_else(|| "native".to_owned(), |fps| format!("{fps:.2}"))
        );
        Ok(Self { path, decoder, pending: Some(first), fresh: true, next_index: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<D: VideoDecoder> FrameSource for VideoFrameSource<D> {
    async fn begin_pass(&mut self) -> Result<(), HidLinkError> {
        self.next_index = 0;
        if std::mem::take(&mut self.fresh) {
            return Ok(());
        }
        self.pending = None;
        debug!("Restarting decoder for {}", self.path.display());
        self.decoder.start(&self.path).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<SourceFrame>, HidLinkError> {
        let decoded = match self.pending.take() {
            Some(frame) => frame,
            None => match self.decoder.next_frame().await? {
                Some(frame) => frame,
                None => return Ok(None),
            },
        };

        let frame_index = self.next_index;
        self.next_index += 1;
        Ok(Some(SourceFrame {
            payload: decoded.data,
            frame_type: FrameType::Jpeg,
            timestamp: decoded.pts,
            origin: FrameOrigin::Video { path: self.path.clone(), frame_index },
        }))
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.decoder
            .frame_rate()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps))
    }

    fn describe(&self) -> String {
        format!("video {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays `frames` JPEG stubs at 25 fps; counts restarts.
    struct ScriptedDecoder {
        frames: u64,
        position: Option<u64>,
        starts: u32,
    }

    impl ScriptedDecoder {
        fn new(frames: u64) -> Self {
            Self { frames, position: None, starts: 0 }
        }
    }

    #[async_trait]
    impl VideoDecoder for ScriptedDecoder {
        async fn start(&mut self, _path: &Path) -> Result<(), DecoderError> {
            self.starts += 1;
            self.position = Some(0);
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Option<DecodedJpeg>, DecoderError> {
            let pos = self.position.as_mut().ok_or(DecoderError::NotStarted)?;
            if *pos >= self.frames {
                return Ok(None);
            }
            let pts = Duration::from_millis(40 * *pos);
            *pos += 1;
            Ok(Some(DecodedJpeg { data: Bytes::from_static(b"\xff\xd8jpeg"), pts: Some(pts) }))
        }

        fn frame_rate(&self) -> Option<f64> {
            Some(25.0)
        }
    }

    fn media_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    async fn pass(source: &mut VideoFrameSource<ScriptedDecoder>) -> Vec<u64> {
        source.begin_pass().await.unwrap();
        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().await.unwrap() {
            match frame.origin {
                FrameOrigin::Video { frame_index, .. } => indices.push(frame_index),
                other => panic!("unexpected origin {other:?}"),
            }
        }
        indices
    }

    #[tokio::test]
    async fn first_pass_reuses_probe_frame_then_restarts() {
        let file = media_file();
        let mut source = VideoFrameSource::open(file.path(), ScriptedDecoder::new(3)).await.unwrap();

        assert_eq!(pass(&mut source).await, vec![0, 1, 2]);
        assert_eq!(source.decoder.starts, 1);
        assert_eq!(pass(&mut source).await, vec![0, 1, 2]);
        assert_eq!(source.decoder.starts, 2);
        assert_eq!(source.frame_interval(), Some(Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn empty_video_is_unavailable() {
        let file = media_file();
        let result = VideoFrameSource::open(file.path(), ScriptedDecoder::new(0)).await;
        assert!(matches!(result, Err(HidLinkError::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = VideoFrameSource::open(dir.path().join("clip.mp4"), ScriptedDecoder::new(5)).await;
        assert!(matches!(result, Err(HidLinkError::SourceUnavailable { .. })));
    }
}
