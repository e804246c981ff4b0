//! hidlink: stream an image folder or a video to the attached panels.
//!
//! ```text
//! hidlink <path>                      Play once on one virtual panel
//! hidlink <path> --loop               Loop until Ctrl-C
//! hidlink <path> --virtual-devices 3  Fan out over three virtual panels
//! hidlink <path> --config sync.json   Load a SyncConfig JSON file
//! hidlink --gen-config                Print the default SyncConfig
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hidlink", version, about = "Stream images or video to USB-HID display panels")]
pub struct Cli {
    /// Image folder or video file to play.
    #[arg(required_unless_present = "gen_config")]
    pub path: Option<PathBuf>,

    /// SyncConfig JSON file; flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of simulated panels to stream to.
    #[arg(long, default_value_t = 1)]
    pub virtual_devices: usize,

    /// Passes over the source.
    #[arg(long, conflicts_with = "loop_forever")]
    pub cycles: Option<u32>,

    /// Loop until interrupted.
    #[arg(long = "loop")]
    pub loop_forever: bool,

    /// Fixed delay between frames, overriding the source frame rate.
    #[arg(long)]
    pub frame_delay_ms: Option<u64>,

    /// Panel brightness, 0-100.
    #[arg(long)]
    pub brightness: Option<u8>,

    /// Fleet deadline in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Resample video to this frame rate.
    #[arg(long)]
    pub fps: Option<u32>,

    /// JPEG quality for video frames, 1-100.
    #[arg(long, default_value_t = 85)]
    pub quality: u8,

    /// Print the default configuration as JSON and exit.
    #[arg(long)]
    pub gen_config: bool,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Usar RUST_LOG=debug para ver cada frame
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    if cli.gen_config {
        println!("{}", serde_json::to_string_pretty(&hidlink_core::SyncConfig::default())?);
        return Ok(());
    }

    info!("hidlink v{}", env!("CARGO_PKG_VERSION"));

    match app::run(cli).await {
        Ok(()) => {
            info!("hidlink exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
