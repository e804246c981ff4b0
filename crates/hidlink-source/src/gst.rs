//! GStreamer-backed [`VideoDecoder`].
//!
//! # Pipeline
//! ```text
//! filesrc → decodebin → videoconvert → [videorate → video/x-raw,framerate=N/1] → jpegenc → appsink
//! ```
//! `decodebin` picks whatever demuxer/decoder the installed plugins offer, so
//! any container GStreamer can play becomes a stream of JPEG frames.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use hidlink_core::DecoderError;
use tracing::{debug, info};

use crate::video::{DecodedJpeg, VideoDecoder};

/// How long one blocking pull waits before the bus is checked for errors.
const PULL_TIMEOUT_MS: u64 = 100;

// ── GstJpegDecoder ─────────────────────────────────────────────────────────────

pub struct GstJpegDecoder {
    quality: u8,
    /// Resample to a fixed rate; `None` keeps the file's native rate.
    target_fps: Option<u32>,
    detected_fps: Option<f64>,
    pipeline: Option<Pipeline>,
}

struct Pipeline {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

impl GstJpegDecoder {
    pub fn new(quality: u8, target_fps: Option<u32>) -> Result<Self, DecoderError> {
        gst::init().map_err(|e| DecoderError::BackendUnavailable(e.to_string()))?;
        for element in ["decodebin", "videoconvert", "jpegenc"] {
            if gst::ElementFactory::find(element).is_none() {
                return Err(DecoderError::BackendUnavailable(format!("missing element '{element}'")));
            }
        }
        Ok(Self {
            quality: quality.clamp(1, 100),
            target_fps: target_fps.filter(|fps| *fps > 0),
            detected_fps: None,
            pipeline: None,
        })
    }

    fn build(&self, path: &Path) -> Result<Pipeline, DecoderError> {
        let rate = match self.target_fps {
            Some(fps) => format!("! videorate ! video/x-raw,framerate={fps}/1 "),
            None => String::new(),
        };
        let pipeline_str = format!(
            "filesrc name=src \
             ! decodebin \
             ! videoconvert \
             {rate}\
             ! jpegenc quality={quality} \
             ! appsink name=sink sync=false max-buffers=8",
            quality = self.quality,
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| DecoderError::GStreamerPipeline(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| DecoderError::GStreamerPipeline("Not a pipeline".into()))?;

        let src = pipeline
            .by_name("src")
            .ok_or_else(|| DecoderError::GStreamerPipeline("No filesrc".into()))?;
        src.set_property("location", path.to_string_lossy().into_owned());

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| DecoderError::GStreamerPipeline("No appsink".into()))?;

        Ok(Pipeline { pipeline, appsink })
    }

    /// First error message waiting on the pipeline bus, if any.
    fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
        let bus = pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl VideoDecoder for GstJpegDecoder {
    async fn start(&mut self, path: &Path) -> Result<(), DecoderError> {
        // Old pipeline goes to NULL before the new one opens the file.
        self.pipeline = None;

        let pipeline = self.build(path)?;
        pipeline
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| DecoderError::GStreamerPipeline("Failed to start pipeline".into()))?;

        info!("GstJpegDecoder started on {}", path.display());
        self.pipeline = Some(pipeline);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<DecodedJpeg>, DecoderError> {
        let Some(active) = self.pipeline.as_ref() else {
            return Err(DecoderError::NotStarted);
        };

        let sample = loop {
            let appsink = active.appsink.clone();
            let pulled = tokio::task::spawn_blocking(move || {
                appsink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
            })
            .await
            .map_err(|e| DecoderError::DecodeFailed { reason: e.to_string() })?;

            if let Some(sample) = pulled {
                break sample;
            }
            if let Some(reason) = Self::bus_error(&active.pipeline) {
                return Err(DecoderError::DecodeFailed { reason });
            }
            if active.appsink.is_eos() {
                debug!("GstJpegDecoder reached end of stream");
                return Ok(None);
            }
        };

        if self.detected_fps.is_none() {
            self.detected_fps = sample
                .caps()
                .and_then(|caps| caps.structure(0))
                .and_then(|s| s.get::<gst::Fraction>("framerate").ok())
                .filter(|f| f.numer() > 0 && f.denom() > 0)
                .map(|f| f64::from(f.numer()) / f64::from(f.denom()));
        }

        let buffer = sample
            .buffer()
            .ok_or_else(|| DecoderError::DecodeFailed { reason: "no buffer in sample".into() })?;
        let map = buffer
            .map_readable()
            .map_err(|_| DecoderError::DecodeFailed { reason: "read map failed".into() })?;

        Ok(Some(DecodedJpeg {
            data: Bytes::copy_from_slice(map.as_slice()),
            pts: buffer.pts().map(|t| Duration::from_nanos(t.nseconds())),
        }))
    }

    fn frame_rate(&self) -> Option<f64> {
        self.target_fps.map(f64::from).or(self.detected_fps)
    }
}
