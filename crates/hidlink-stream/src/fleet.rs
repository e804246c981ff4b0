//! `DeviceFleetCoordinator`: one operation fanned out over many devices.
//!
//! Each device gets its own tokio task and its own child cancellation token,
//! so one slow or failing panel never holds up the others:
//!
//! ```text
//!            parent token (Ctrl-C)
//!        ┌────────┼────────┐
//!      child    child    child
//!        │        │        │
//!     task[a]  task[b]  task[c] ──► FleetReport { a: ok, b: ok, c: timed out }
//! ```
//!
//! At the deadline every unfinished device is recorded as timed out and its
//! token cancelled; the task then has [`DEFAULT_TEARDOWN_GRACE`] to run its
//! teardown before it is aborted.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use hidlink_core::{DeviceId, HidLinkError, SyncConfig, SyncEvent};
use hidlink_device::DeviceHandle;
use hidlink_source::FrameSource;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::session::{SessionReport, StreamingSession};

pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DeviceRunResult {
    Finished(SessionReport),
    /// Still running at the fleet deadline.
    TimedOut,
    /// The device task panicked.
    Panicked(String),
}

impl DeviceRunResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Finished(report) if report.succeeded())
    }

    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            Self::Finished(report) => Some(report),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finished(report) => write!(
                f,
                "{} ({} frames, {} cycle(s))",
                report.outcome, report.frames_sent, report.cycles_completed
            ),
            Self::TimedOut => f.write_str("timed out"),
            Self::Panicked(reason) => write!(f, "panicked: {reason}"),
        }
    }
}

/// Per-device results of one fleet operation, keyed by device id.
#[derive(Debug, Default)]
pub struct FleetReport {
    results: BTreeMap<DeviceId, DeviceRunResult>,
}

impl FleetReport {
    /// `true` per device that completed its run.
    pub fn outcomes(&self) -> BTreeMap<DeviceId, bool> {
        self.results.iter().map(|(id, r)| (id.clone(), r.succeeded())).collect()
    }

    pub fn get(&self, device: &DeviceId) -> Option<&DeviceRunResult> {
        self.results.get(device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &DeviceRunResult)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.values().filter(|r| r.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded_count() == self.len()
    }

    /// "N of M devices succeeded".
    pub fn summary(&self) -> String {
        format!("{} of {} devices succeeded", self.succeeded_count(), self.len())
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

pub struct DeviceFleetCoordinator {
    cancel: CancellationToken,
    teardown_grace: Duration,
}

impl Default for DeviceFleetCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceFleetCoordinator {
    pub fn new() -> Self {
        Self { cancel: CancellationToken::new(), teardown_grace: DEFAULT_TEARDOWN_GRACE }
    }

    /// Cancelling `cancel` stops every device of every operation.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `operation` on every device concurrently. Only the devices passed
    /// in appear in the report; attach/detach during the run has no effect.
    pub async fn run_on_all<F, Fut>(
        &self,
        devices: Vec<DeviceHandle>,
        operation: F,
        timeout: Option<Duration>,
    ) -> FleetReport
    where
        F: Fn(DeviceHandle, CancellationToken) -> Fut,
        Fut: Future<Output = SessionReport> + Send + 'static,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        info!(
            "Fleet: starting on {} device(s){}",
            devices.len(),
            timeout.map_or_else(String::new, |t| format!(", deadline {}s", t.as_secs_f32()))
        );

        let tasks: Vec<(DeviceId, CancellationToken, JoinHandle<SessionReport>)> = devices
            .into_iter()
            .map(|device| {
                let id = device.id().clone();
                let token = self.cancel.child_token();
                let handle = tokio::spawn(operation(device, token.clone()));
                (id, token, handle)
            })
            .collect();

        let mut report = FleetReport::default();
        let mut overdue = Vec::new();
        for (id, token, mut handle) in tasks {
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await.ok(),
                None => Some((&mut handle).await),
            };
            let result = match joined {
                Some(Ok(session)) => DeviceRunResult::Finished(session),
                Some(Err(e)) => {
                    warn!("Device[{}] task panicked: {}", id, e);
                    DeviceRunResult::Panicked(e.to_string())
                }
                None => {
                    warn!("Device[{}] {}", id, HidLinkError::Timeout { ms: timeout_ms(timeout) });
                    token.cancel();
                    overdue.push((id.clone(), handle));
                    DeviceRunResult::TimedOut
                }
            };
            if report.results.insert(id.clone(), result).is_some() {
                warn!("Device[{}] listed twice; keeping the last result", id);
            }
        }

        self.reap(overdue).await;
        info!("Fleet: {}", report.summary());
        report
    }

    /// Build a [`StreamingSession`] per device from `make_source` and run them
    /// all with the fleet deadline from `config`.
    pub async fn stream_to_all<S, F, Fut>(
        &self,
        devices: Vec<DeviceHandle>,
        config: &SyncConfig,
        events: Option<mpsc::UnboundedSender<SyncEvent>>,
        make_source: F,
    ) -> FleetReport
    where
        S: FrameSource + 'static,
        F: Fn(&DeviceHandle) -> Fut,
        Fut: Future<Output = Result<S, HidLinkError>> + Send + 'static,
    {
        let operation = |device: DeviceHandle, cancel: CancellationToken| {
            let source = make_source(&device);
            let config = config.clone();
            let events = events.clone();
            async move {
                let source = match source.await {
                    Ok(source) => source,
                    Err(e) => return SessionReport::failed(device.id().clone(), e),
                };
                let mut session = StreamingSession::new(device, source, config).with_cancellation(cancel);
                if let Some(events) = events {
                    session = session.with_events(events);
                }
                session.run().await
            }
        };
        self.run_on_all(devices, operation, config.fleet_timeout()).await
    }

    /// Give cancelled tasks the teardown grace, then abort what is left.
    async fn reap(&self, overdue: Vec<(DeviceId, JoinHandle<SessionReport>)>) {
        let grace_deadline = Instant::now() + self.teardown_grace;
        for (id, mut handle) in overdue {
            match tokio::time::timeout_at(grace_deadline, &mut handle).await {
                Ok(Ok(late)) => info!("Device[{}] stopped after deadline ({})", id, late.outcome),
                Ok(Err(e)) => warn!("Device[{}] task failed after deadline: {}", id, e),
                Err(_) => {
                    warn!("Device[{}] teardown exceeded grace period; aborting", id);
                    handle.abort();
                }
            }
        }
    }
}

fn timeout_ms(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, |t| t.as_millis() as u64)
}
