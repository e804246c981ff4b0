//! `DeviceHandle`: shared, cloneable handle to one attached display.
//!
//! Every outbound write (frames from the streaming session, heartbeats from
//! the keep-alive task, ad-hoc commands from the UI) goes through the same
//! `tokio::sync::Mutex`, so packets of different writers never interleave on
//! the wire.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hidlink_core::{DeviceError, DeviceId, DeviceInfo, FrameEnvelope, HidLinkError};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::DeviceChannel;
use crate::command::{CommandResponse, DeviceCommand};

/// `DeviceHandle` is `Clone` and cheap to hand to the session and the heartbeat task.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    info: DeviceInfo,
    channel: Mutex<Box<dyn DeviceChannel>>,
    connected: AtomicBool,
    /// Host-side view of the power state, tracked from the Sleep/Wake
    /// commands this handle issued.
    asleep: AtomicBool,
    claimed: AtomicBool,
    frames_written: AtomicU64,
}

impl DeviceHandle {
    pub fn new(info: DeviceInfo, channel: impl DeviceChannel + 'static) -> Self {
        Self::from_boxed(info, Box::new(channel))
    }

    pub fn from_boxed(info: DeviceInfo, channel: Box<dyn DeviceChannel>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                info,
                channel: Mutex::new(channel),
                connected: AtomicBool::new(true),
                asleep: AtomicBool::new(false),
                claimed: AtomicBool::new(false),
                frames_written: AtomicU64::new(0),
            }),
        }
    }

    // ── Identity / state ─────────────────────────────────────────────────────

    pub fn id(&self) -> &DeviceId {
        &self.inner.info.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    pub fn is_asleep(&self) -> bool {
        self.inner.asleep.load(Ordering::Acquire)
    }

    /// Record a power state learned out of band (e.g. from the device list).
    pub fn mark_asleep(&self, asleep: bool) {
        self.inner.asleep.store(asleep, Ordering::Release);
    }

    /// Total frames successfully written through this handle.
    pub fn frames_written(&self) -> u64 {
        self.inner.frames_written.load(Ordering::Relaxed)
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    pub async fn send_frame(&self, envelope: &FrameEnvelope) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::Disconnected);
        }
        let mut channel = self.inner.channel.lock().await;
        channel
            .send_frame(envelope.payload.clone(), envelope.transfer_id, envelope.frame_type)
            .await?;
        self.inner.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send a control command. A non-zero response status is returned as
    /// [`DeviceError::Rejected`].
    pub async fn command(&self, command: DeviceCommand) -> Result<CommandResponse, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::Disconnected);
        }
        let channel = self.inner.channel.lock().await;
        self.write_command(channel, command).await
    }

    /// Like [`command`](Self::command), but gives up while still waiting for
    /// the device lock once `cancel` fires. Returns `Ok(None)` when nothing
    /// was written; a write that already holds the lock always completes.
    pub async fn command_unless_cancelled(
        &self,
        command: DeviceCommand,
        cancel: &CancellationToken,
    ) -> Result<Option<CommandResponse>, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::Disconnected);
        }
        let channel = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            channel = self.inner.channel.lock() => channel,
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.write_command(channel, command).await.map(Some)
    }

    async fn write_command(
        &self,
        mut channel: MutexGuard<'_, Box<dyn DeviceChannel>>,
        command: DeviceCommand,
    ) -> Result<CommandResponse, DeviceError> {
        let opcode = command.opcode();
        let response = channel.send_command(opcode, command.encode_args()).await;
        drop(channel);
        let response = response?;
        if !response.is_ok() {
            return Err(DeviceError::Rejected { opcode, status: response.status });
        }

        match command {
            DeviceCommand::Sleep => self.mark_asleep(true),
            DeviceCommand::Wake => self.mark_asleep(false),
            _ => {}
        }
        debug!("Device[{}] {} ok", self.id(), command.name());
        Ok(response)
    }

    /// Explicit disconnect. Waits for any in-flight write, then closes the channel.
    pub async fn disconnect(&self) {
        if !self.inner.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.channel.lock().await.close().await;
        info!("Device[{}] disconnected", self.id());
    }

    // ── Session claim ────────────────────────────────────────────────────────

    /// Reserve the device for one streaming session. The claim is released
    /// when the returned guard drops.
    pub fn try_claim(&self) -> Result<SessionClaim, HidLinkError> {
        if self.inner.claimed.swap(true, Ordering::AcqRel) {
            return Err(HidLinkError::DeviceBusy { device: self.id().to_string() });
        }
        Ok(SessionClaim { device: self.clone() })
    }

    pub fn is_claimed(&self) -> bool {
        self.inner.claimed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("info", &self.inner.info)
            .field("connected", &self.is_connected())
            .field("asleep", &self.is_asleep())
            .finish()
    }
}

/// Exclusive right to stream to a device. See [`DeviceHandle::try_claim`].
#[must_use = "the claim is released as soon as it is dropped"]
pub struct SessionClaim {
    device: DeviceHandle,
}

impl SessionClaim {
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.device.inner.claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::opcode;
    use crate::virtual_device::{VirtualDevice, WireRecord};

    fn device() -> (DeviceHandle, crate::VirtualDeviceProbe) {
        let (channel, probe) = VirtualDevice::new();
        (DeviceHandle::new(DeviceInfo::new("panel-0", "Panel", 0x0416, 0x5302), channel), probe)
    }

    #[tokio::test]
    async fn tracks_power_state_from_commands() {
        let (dev, _probe) = device();
        assert!(!dev.is_asleep());
        dev.command(DeviceCommand::Sleep).await.unwrap();
        assert!(dev.is_asleep());
        dev.command(DeviceCommand::Wake).await.unwrap();
        assert!(!dev.is_asleep());
    }

    #[tokio::test]
    async fn rejected_command_surfaces_status() {
        let (channel, _probe) = VirtualDevice::new();
        let channel = channel.reject_opcode(opcode::SET_BRIGHTNESS, 0x05);
        let dev = DeviceHandle::new(DeviceInfo::new("panel-1", "Panel", 0, 0), channel);

        let err = dev.command(DeviceCommand::SetBrightness(50)).await.unwrap_err();
        assert!(matches!(err, DeviceError::Rejected { opcode: opcode::SET_BRIGHTNESS, status: 0x05 }));
    }

    #[tokio::test]
    async fn writes_after_disconnect_fail() {
        let (dev, probe) = device();
        dev.disconnect().await;
        dev.disconnect().await;

        assert!(matches!(dev.command(DeviceCommand::Wake).await, Err(DeviceError::Disconnected)));
        assert_eq!(probe.records(), vec![WireRecord::Closed]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting_for_the_lock_writes_nothing() {
        let (channel, probe) = VirtualDevice::new();
        let channel = channel.with_write_latency(std::time::Duration::from_millis(100));
        let dev = DeviceHandle::new(DeviceInfo::new("panel-2", "Panel", 0, 0), channel);
        let cancel = CancellationToken::new();

        let busy = dev.clone();
        let writer = tokio::spawn(async move { busy.command(DeviceCommand::Wake).await });
        tokio::task::yield_now().await;

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            stopper.cancel();
        });
        let queued = dev.command_unless_cancelled(DeviceCommand::heartbeat_now(), &cancel).await.unwrap();

        assert!(queued.is_none());
        writer.await.unwrap().unwrap();
        assert_eq!(probe.heartbeat_count(), 0);
    }

    #[test]
    fn only_one_session_claim_at_a_time() {
        let (dev, _probe) = device();
        let claim = dev.try_claim().unwrap();
        assert!(matches!(dev.try_claim(), Err(HidLinkError::DeviceBusy { .. })));
        drop(claim);
        assert!(dev.try_claim().is_ok());
    }
}
