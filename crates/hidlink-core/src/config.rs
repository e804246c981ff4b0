use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::display_buffer::DEFAULT_BUFFER_DEPTH;
use crate::errors::HidLinkError;
use crate::types::{CycleCount, Rotation};

/// Interval between host heartbeats. Fixed by the firmware protocol.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(4_000);

/// The device watchdog must tolerate at least this many missed heartbeats.
pub const MIN_HEARTBEATS_PER_WATCHDOG: u32 = 3;

/// Pacing used when neither the config nor the source knows a frame rate.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Configuração de uma execução de streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub cycles: CycleCount,
    /// Fixed inter-frame delay. `None` derives it from the source frame rate.
    #[serde(alias = "frameDelayMs")]
    pub frame_delay_ms: Option<u64>,
    #[serde(alias = "bufferDepth")]
    pub buffer_depth: usize,
    /// Panel brightness, percent.
    pub brightness: u8,
    pub rotation: Option<Rotation>,
    /// Device-side watchdog; the panel leaves real-time mode when no
    /// heartbeat arrives for this long.
    #[serde(alias = "keepAliveTimeoutSecs")]
    pub keep_alive_timeout_secs: u16,
    /// Overall deadline for a fleet run. `None` waits indefinitely.
    #[serde(alias = "fleetTimeoutSecs")]
    pub fleet_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cycles: CycleCount::Fixed(1),
            frame_delay_ms: None,
            buffer_depth: DEFAULT_BUFFER_DEPTH,
            brightness: 100,
            rotation: None,
            keep_alive_timeout_secs: 60,
            fleet_timeout_secs: None,
        }
    }
}

impl SyncConfig {
    /// Loop the source until the run is cancelled.
    pub fn looping() -> Self {
        Self { cycles: CycleCount::Infinite, ..Self::default() }
    }

    pub fn from_json_str(json: &str) -> Result<Self, HidLinkError> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| HidLinkError::ConfigurationInvalid { reason: e.to_string() })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, HidLinkError> {
        let json = std::fs::read_to_string(path)?;
        let cfg = Self::from_json_str(&json)?;
        debug!("Loaded sync config from {}: {:?}", path.display(), cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), HidLinkError> {
        let invalid = |reason: String| Err(HidLinkError::ConfigurationInvalid { reason });

        if self.cycles == CycleCount::Fixed(0) {
            return invalid("cycles must be at least 1".into());
        }
        if self.buffer_depth == 0 {
            return invalid("buffer_depth must be at least 1".into());
        }
        if self.brightness > 100 {
            return invalid(format!("brightness {} exceeds 100", self.brightness));
        }
        if self.frame_delay_ms == Some(0) {
            return invalid("frame_delay_ms must be positive".into());
        }
        let min_timeout = HEARTBEAT_INTERVAL * MIN_HEARTBEATS_PER_WATCHDOG;
        if self.keep_alive_timeout() < min_timeout {
            return invalid(format!(
                "keep_alive_timeout_secs {} must be at least {}s ({} heartbeat intervals)",
                self.keep_alive_timeout_secs,
                min_timeout.as_secs(),
                MIN_HEARTBEATS_PER_WATCHDOG
            ));
        }
        Ok(())
    }

    pub fn frame_delay(&self) -> Option<Duration> {
        self.frame_delay_ms.map(Duration::from_millis)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs as u64)
    }

    pub fn fleet_timeout(&self) -> Option<Duration> {
        self.fleet_timeout_secs.map(Duration::from_secs)
    }
}
