//! Periodic heartbeat to one device.
//!
//! The panel reverts to its idle screen when its watchdog (configured with
//! `SetKeepAliveTimeout`, 60 s by default) sees no heartbeat. The scheduler
//! runs on its own tokio task, independent of the frame pump, and shares the
//! device lock with it:
//!
//! ```text
//! frame pump ──┐
//!              ├─► DeviceHandle (Mutex) ─► DeviceChannel
//! heartbeat ───┘   every 4 s
//! ```
//!
//! A failed heartbeat is logged and skipped; the watchdog tolerates several
//! missed beats, so one bad write must not end a stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hidlink_core::HEARTBEAT_INTERVAL;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::DeviceCommand;
use crate::handle::DeviceHandle;

struct KeepAliveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owned per device session; stopped on [`stop`](Self::stop) or drop. Drop
/// only signals the task; `stop` also waits for it to exit.
#[derive(Default)]
pub struct KeepAliveScheduler {
    task: Option<KeepAliveTask>,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl KeepAliveScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start beating every [`HEARTBEAT_INTERVAL`].
    pub fn start(&mut self, device: DeviceHandle) {
        self.start_with_interval(device, HEARTBEAT_INTERVAL);
    }

    /// Start beating every `interval`, restarting if already running. The
    /// first beat goes out one interval after start.
    pub fn start_with_interval(&mut self, device: DeviceHandle, interval: Duration) {
        self.signal_stop();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            device,
            interval,
            cancel.clone(),
            Arc::clone(&self.sent),
            Arc::clone(&self.failed),
        ));
        self.task = Some(KeepAliveTask { cancel, handle });
    }

    /// Idempotent; safe to call when never started. A heartbeat already
    /// holding the device lock completes, one still waiting for it is
    /// dropped. Once this returns, no further heartbeat reaches the device.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!("Heartbeat task ended abnormally: {}", e);
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn heartbeats_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

// ── Heartbeat task ────────────────────────────────────────────────────────────

async fn run_heartbeat(
    device: DeviceHandle,
    interval: Duration,
    cancel: CancellationToken,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
) {
    let id = device.id().clone();
    info!("Device[{}] heartbeat started ({} ms)", id, interval.as_millis());

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match device.command_unless_cancelled(DeviceCommand::heartbeat_now(), &cancel).await {
            Ok(None) => break,
            Ok(Some(_)) => {
                sent.fetch_add(1, Ordering::Relaxed);
                debug!("Device[{}] heartbeat", id);
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                warn!("Device[{}] heartbeat failed: {}", id, e);
            }
        }
    }

    info!("Device[{}] heartbeat stopped", id);
}
