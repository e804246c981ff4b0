//! `StreamingSession`: one end-to-end run of a frame source on one device.
//!
//! ```text
//! Idle → Preparing → Active → Draining → Completed
//!                      │          └────→ Cancelled
//!                      └──────────────→ Failed
//! ```
//!
//! Setup commands go out in `Preparing`, the frame pump runs in `Active`
//! (write, push into the display buffer, announce, wait), and `Draining`
//! announces the frames still queued on the device. Every run that leaves
//! `Idle` ends with teardown: heartbeat stopped, then real-time mode off. A
//! run whose token is already cancelled never leaves `Idle`.

use std::time::Duration;

use hidlink_core::{
    DeviceDisplayBuffer, DeviceId, DisplayEvent, FrameEnvelope, HidLinkError, SessionState,
    SyncConfig, SyncEvent, TransferIdAllocator, HEARTBEAT_INTERVAL,
};
use hidlink_device::{DeviceCommand, DeviceHandle, KeepAliveScheduler};
use hidlink_source::FrameSource;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pacing::FramePacer;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    /// Stopped through the cancellation token. Not an error.
    Cancelled,
    Failed(HidLinkError),
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Result of [`StreamingSession::run`].
#[derive(Debug)]
pub struct SessionReport {
    pub device: DeviceId,
    pub run_id: Uuid,
    pub outcome: SessionOutcome,
    pub frames_sent: u64,
    pub frames_displayed: u64,
    pub cycles_completed: u64,
}

impl SessionReport {
    /// Report for a run that failed before touching the device.
    pub fn failed(device: DeviceId, error: HidLinkError) -> Self {
        Self {
            device,
            run_id: Uuid::new_v4(),
            outcome: SessionOutcome::Failed(error),
            frames_sent: 0,
            frames_displayed: 0,
            cycles_completed: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&HidLinkError> {
        match &self.outcome {
            SessionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

// ── StreamingSession ──────────────────────────────────────────────────────────

pub struct StreamingSession<S> {
    link: DeviceLink,
    source: S,
}

/// Everything a run needs besides the source. Kept apart from `S` so phase
/// futures only borrow `Sync` state.
struct DeviceLink {
    device: DeviceHandle,
    config: SyncConfig,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
}

/// Mutable state of one `run()`.
struct RunState {
    id: Uuid,
    state: SessionState,
    cycle: u64,
    allocator: TransferIdAllocator,
    buffer: DeviceDisplayBuffer,
    pacer: FramePacer,
    frames_sent: u64,
    frames_displayed: u64,
    cycles_completed: u64,
}

impl<S: FrameSource> StreamingSession<S> {
    pub fn new(device: DeviceHandle, source: S, config: SyncConfig) -> Self {
        Self {
            link: DeviceLink {
                device,
                config,
                events: None,
                cancel: CancellationToken::new(),
                heartbeat_interval: HEARTBEAT_INTERVAL,
            },
            source,
        }
    }

    /// UI channel for `FrameDisplaying` and `StateChanged` events.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.link.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.link.cancel = cancel;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.link.heartbeat_interval = interval;
        self
    }

    /// Token that stops this session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.link.cancel.clone()
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.link.device
    }

    pub async fn run(self) -> SessionReport {
        let Self { link, mut source } = self;
        let mut run = RunState {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            cycle: 0,
            allocator: TransferIdAllocator::new(),
            buffer: DeviceDisplayBuffer::new(link.config.buffer_depth),
            pacer: FramePacer::new(link.config.frame_delay(), None),
            frames_sent: 0,
            frames_displayed: 0,
            cycles_completed: 0,
        };
        info!(
            "Device[{}] run {} starting: {} ({} cycle(s))",
            link.device.id(),
            run.id,
            source.describe(),
            link.config.cycles
        );

        // ── 1. Claim + first pass (no device traffic yet) ─────────────────
        let _claim = match link.device.try_claim() {
            Ok(claim) => claim,
            Err(e) => return link.finish(run, SessionOutcome::Failed(e)),
        };
        if let Err(e) = source.begin_pass().await {
            return link.finish(run, SessionOutcome::Failed(e));
        }
        run.pacer = FramePacer::new(link.config.frame_delay(), source.frame_interval());
        if link.cancel.is_cancelled() {
            info!("Device[{}] cancelled before setup", link.device.id());
            return link.finish(run, SessionOutcome::Cancelled);
        }

        // ── 2. Preparing ──────────────────────────────────────────────────
        link.set_state(&mut run, SessionState::Preparing);
        let mut keepalive = KeepAliveScheduler::new();
        if let Err(e) = link.prepare(&mut keepalive).await {
            link.teardown(&run, &mut keepalive).await;
            return link.finish(run, SessionOutcome::Failed(e));
        }

        // ── 3. Active ─────────────────────────────────────────────────────
        link.set_state(&mut run, SessionState::Active);
        let pumped = link.pump(&mut source, &mut run).await;

        // ── 4. Draining ───────────────────────────────────────────────────
        let outcome = match pumped {
            Ok(()) => SessionOutcome::Completed,
            Err(e) if e.is_cancelled() => {
                info!("Device[{}] cancelled at cycle {}", link.device.id(), run.cycle);
                SessionOutcome::Cancelled
            }
            Err(e) => {
                link.teardown(&run, &mut keepalive).await;
                return link.finish(run, SessionOutcome::Failed(e));
            }
        };
        link.set_state(&mut run, SessionState::Draining);
        link.drain(&mut run).await;

        link.teardown(&run, &mut keepalive).await;
        link.finish(run, outcome)
    }
}

impl DeviceLink {
    // ── Phases ────────────────────────────────────────────────────────────────

    async fn prepare(&self, keepalive: &mut KeepAliveScheduler) -> Result<(), HidLinkError> {
        if self.device.is_asleep() {
            self.setup_step("wake", DeviceCommand::Wake).await?;
        }
        self.setup_step("real-time mode", DeviceCommand::SetRealtimeMode(true)).await?;
        self.setup_step("brightness", DeviceCommand::SetBrightness(self.config.brightness)).await?;
        if let Some(rotation) = self.config.rotation {
            self.setup_step("rotation", DeviceCommand::SetRotation(rotation)).await?;
        }
        self.setup_step(
            "keep-alive timeout",
            DeviceCommand::keep_alive_timeout(self.config.keep_alive_timeout()),
        )
        .await?;

        keepalive.start_with_interval(self.device.clone(), self.heartbeat_interval);
        Ok(())
    }

    async fn setup_step(&self, step: &'static str, command: DeviceCommand) -> Result<(), HidLinkError> {
        self.device
            .command(command)
            .await
            .map(|_| ())
            .map_err(|source| HidLinkError::DeviceSetupFailed { step, source })
    }

    /// Frame pump. `Err(Cancelled)` hands over to draining; any other error
    /// fails the run.
    async fn pump<S: FrameSource>(&self, source: &mut S, run: &mut RunState) -> Result<(), HidLinkError> {
        while self.config.cycles.includes(run.cycle) {
            if run.cycle > 0 {
                source.begin_pass().await?;
                run.pacer.begin_pass();
            }

            let mut frames_this_pass = 0u64;
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(HidLinkError::Cancelled),
                    next = source.next_frame() => next?,
                };
                let Some(frame) = frame else { break };

                if self.cancel.is_cancelled() {
                    return Err(HidLinkError::Cancelled);
                }

                let envelope = FrameEnvelope {
                    payload: frame.payload,
                    transfer_id: run.allocator.next(),
                    frame_type: frame.frame_type,
                    sequence_index: run.frames_sent,
                    cycle: run.cycle,
                    source_timestamp: frame.timestamp,
                    origin: frame.origin,
                };
                // In-flight writes are never interrupted.
                self.device
                    .send_frame(&envelope)
                    .await
                    .map_err(|source| HidLinkError::DeviceWriteFailed {
                        sequence_index: envelope.sequence_index,
                        source,
                    })?;
                debug!(
                    "Device[{}] wrote frame #{} (id {}, {} bytes)",
                    self.device.id(),
                    envelope.sequence_index,
                    envelope.transfer_id,
                    envelope.payload.len()
                );
                run.frames_sent += 1;
                frames_this_pass += 1;
                run.pacer.observe(envelope.source_timestamp);

                if let Some(displaying) = run.buffer.push(envelope) {
                    self.announce(run, displaying);
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(HidLinkError::Cancelled),
                    _ = tokio::time::sleep(run.pacer.delay()) => {}
                }
            }

            if frames_this_pass == 0 {
                return Err(HidLinkError::source_unavailable(
                    source.describe(),
                    format!("pass {} yielded no frames", run.cycle),
                ));
            }
            run.cycles_completed += 1;
            run.cycle += 1;
            debug!("Device[{}] cycle {} done", self.device.id(), run.cycles_completed);
        }
        Ok(())
    }

    /// Announce what is still queued on the device. The first remaining frame
    /// follows immediately; each later one waits one frame delay, unless the
    /// run was cancelled.
    async fn drain(&self, run: &mut RunState) {
        let delay = run.pacer.delay();
        let remaining: Vec<FrameEnvelope> = run.buffer.drain().collect();
        for (i, envelope) in remaining.into_iter().enumerate() {
            if i > 0 && !self.cancel.is_cancelled() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            self.announce(run, envelope);
        }
    }

    /// The heartbeat is fully stopped before real-time mode goes off, so no
    /// beat reaches the device after the disable command.
    async fn teardown(&self, run: &RunState, keepalive: &mut KeepAliveScheduler) {
        keepalive.stop().await;
        if let Err(e) = self.device.command(DeviceCommand::SetRealtimeMode(false)).await {
            warn!("Device[{}] run {}: disabling real-time mode failed: {}", self.device.id(), run.id, e);
        }
        debug!(
            "Device[{}] teardown done ({} heartbeat(s), {} failed)",
            self.device.id(),
            keepalive.heartbeats_sent(),
            keepalive.heartbeats_failed()
        );
    }

    // ── Events ────────────────────────────────────────────────────────────────

    fn announce(&self, run: &mut RunState, envelope: FrameEnvelope) {
        run.frames_displayed += 1;
        debug!(
            "Device[{}] now displaying #{} ({})",
            self.device.id(),
            envelope.sequence_index,
            envelope.origin
        );
        self.emit(SyncEvent::FrameDisplaying(DisplayEvent::from_envelope(
            self.device.id().clone(),
            envelope,
        )));
    }

    fn set_state(&self, run: &mut RunState, state: SessionState) {
        debug!("Device[{}] {} → {}", self.device.id(), run.state, state);
        run.state = state;
        self.emit(SyncEvent::StateChanged { device: self.device.id().clone(), state });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            // A closed UI channel must not stop the stream.
            let _ = events.send(event);
        }
    }

    fn finish(&self, mut run: RunState, outcome: SessionOutcome) -> SessionReport {
        let terminal = match &outcome {
            SessionOutcome::Completed => SessionState::Completed,
            SessionOutcome::Cancelled => SessionState::Cancelled,
            SessionOutcome::Failed(_) => SessionState::Failed,
        };
        self.set_state(&mut run, terminal);

        match &outcome {
            SessionOutcome::Failed(e) => warn!("Device[{}] run {} failed: {}", self.device.id(), run.id, e),
            other => info!(
                "Device[{}] run {} {}: {} sent, {} displayed, {} cycle(s)",
                self.device.id(),
                run.id,
                other,
                run.frames_sent,
                run.frames_displayed,
                run.cycles_completed
            ),
        }

        SessionReport {
            device: self.device.id().clone(),
            run_id: run.id,
            outcome,
            frames_sent: run.frames_sent,
            frames_displayed: run.frames_displayed,
            cycles_completed: run.cycles_completed,
        }
    }
}
