use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use hidlink_core::{CycleCount, DeviceInfo, HidLinkError, SyncConfig, SyncEvent};
use hidlink_device::{DeviceHandle, DeviceRegistry, VirtualDevice};
use hidlink_source::{DirectoryImageSource, FrameSource};
use hidlink_stream::DeviceFleetCoordinator;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Cli;

/// Vendor/product ids reported by the simulated panels.
const VIRTUAL_VID: u16 = 0x0416;
const VIRTUAL_PID: u16 = 0x5302;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(feature = "gstreamer"), allow(dead_code))]
struct VideoOptions {
    quality: u8,
    fps: Option<u32>,
}

/// Main run: build the config, open the source once to fail fast, attach the
/// panels and stream to all of them until done or Ctrl-C.
pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let path = cli.path.clone().context("no source path given")?;
    let video = VideoOptions { quality: cli.quality, fps: cli.fps };

    // ── Source check (before any device traffic) ──────────────────────────
    let probe = open_source(path.clone(), video).await?;
    info!("Source: {}", probe.describe());
    drop(probe);

    // ── Devices ───────────────────────────────────────────────────────────
    let registry = DeviceRegistry::new();
    for i in 0..cli.virtual_devices.max(1) {
        let (channel, _probe) = VirtualDevice::new();
        let info = DeviceInfo::new(format!("virtual-{i}"), format!("Virtual Panel {i}"), VIRTUAL_VID, VIRTUAL_PID);
        registry.attach(DeviceHandle::new(info, channel));
    }
    info!("Streaming to {} panel(s), {} cycle(s)", registry.len(), config.cycles);

    // ── Ctrl-C → cancel every device ──────────────────────────────────────
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping all panels...");
            ctrl_c.cancel();
        }
    });

    // ── UI events ─────────────────────────────────────────────────────────
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));

    let fleet = DeviceFleetCoordinator::new().with_cancellation(cancel.clone());
    let report = fleet
        .stream_to_all(registry.snapshot(), &config, Some(events_tx), |_device| {
            open_source(path.clone(), video)
        })
        .await;
    let _ = printer.await;

    for (id, result) in report.iter() {
        info!("Device[{}] {}", id, result);
    }
    for device in registry.snapshot() {
        registry.disconnect(device.id()).await;
    }

    let summary = report.summary();
    if cancel.is_cancelled() {
        info!("{} (interrupted)", summary);
        return Ok(());
    }
    if !report.all_succeeded() {
        bail!(summary);
    }
    info!("{}", summary);
    Ok(())
}

fn build_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SyncConfig::default(),
    };

    if cli.loop_forever {
        config.cycles = CycleCount::Infinite;
    } else if let Some(n) = cli.cycles {
        config.cycles = CycleCount::Fixed(n);
    }
    if let Some(ms) = cli.frame_delay_ms {
        config.frame_delay_ms = Some(ms);
    }
    if let Some(brightness) = cli.brightness {
        config.brightness = brightness;
    }
    if let Some(secs) = cli.timeout {
        config.fleet_timeout_secs = Some(secs);
    }

    config.validate()?;
    debug!("Effective config: {:?}", config);
    Ok(config)
}

async fn open_source(path: PathBuf, video: VideoOptions) -> Result<Box<dyn FrameSource>, HidLinkError> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| HidLinkError::source_unavailable(&path, e.to_string()))?;
    if metadata.is_dir() {
        return Ok(Box::new(DirectoryImageSource::open(path).await?));
    }
    open_video(path, video).await
}

#[cfg(feature = "gstreamer")]
async fn open_video(path: PathBuf, video: VideoOptions) -> Result<Box<dyn FrameSource>, HidLinkError> {
    use hidlink_source::{GstJpegDecoder, VideoFrameSource};

    let decoder = GstJpegDecoder::new(video.quality, video.fps)?;
    Ok(Box::new(VideoFrameSource::open(path, decoder).await?))
}

#[cfg(not(feature = "gstreamer"))]
async fn open_video(path: PathBuf, _video: VideoOptions) -> Result<Box<dyn FrameSource>, HidLinkError> {
    Err(HidLinkError::source_unavailable(
        path,
        "video playback requires building with `--features gstreamer`",
    ))
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::FrameDisplaying(e) => info!(
                "Device[{}] ▶ #{} cycle {} ({}, {} bytes)",
                e.device,
                e.sequence_index,
                e.cycle,
                e.origin,
                e.payload.len()
            ),
            SyncEvent::StateChanged { device, state } => {
                if state.is_terminal() {
                    info!("Device[{}] {}", device, state);
                } else {
                    debug!("Device[{}] {}", device, state);
                }
            }
        }
    }
}
