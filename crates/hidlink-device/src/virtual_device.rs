//! In-process simulated display.
//!
//! Stands in for real HID hardware in dry runs and tests: every write that
//! reaches the "device" is appended to a shared log that a
//! [`VirtualDeviceProbe`] can inspect, and faults (rejected commands, broken
//! frame writes, slow links) can be injected up front.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{DeviceError, FrameType, TransferId};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::DeviceChannel;
use crate::command::{CommandResponse, DeviceCommand};

/// One write observed by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRecord {
    Frame { transfer_id: u8, frame_type: FrameType, len: usize },
    Command(DeviceCommand),
    Closed,
}

type WireLog = Arc<Mutex<Vec<(Instant, WireRecord)>>>;

pub struct VirtualDevice {
    log: WireLog,
    rejected: HashMap<u8, u8>,
    failing: HashSet<u8>,
    fail_frame_at: Option<u64>,
    frames_seen: u64,
    write_latency: Duration,
    closed: bool,
}

impl VirtualDevice {
    pub fn new() -> (Self, VirtualDeviceProbe) {
        let log = WireLog::default();
        let device = Self {
            log: Arc::clone(&log),
            rejected: HashMap::new(),
            failing: HashSet::new(),
            fail_frame_at: None,
            frames_seen: 0,
            write_latency: Duration::ZERO,
            closed: false,
        };
        (device, VirtualDeviceProbe { log })
    }

    /// Answer `opcode` with a non-zero status.
    pub fn reject_opcode(mut self, opcode: u8, status: u8) -> Self {
        self.rejected.insert(opcode, status);
        self
    }

    /// Fail `opcode` at the transport level (the device never sees it).
    pub fn fail_opcode(mut self, opcode: u8) -> Self {
        self.failing.insert(opcode);
        self
    }

    /// Fail the frame write with this zero-based index and every one after it.
    pub fn fail_frames_from(mut self, index: u64) -> Self {
        self.fail_frame_at = Some(index);
        self
    }

    /// Simulated time each write occupies the link.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    fn record(&self, record: WireRecord) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((Instant::now(), record));
    }

    async fn occupy_link(&self) {
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
    }
}

#[async_trait]
impl DeviceChannel for VirtualDevice {
    async fn send_frame(
        &mut self,
        payload: Bytes,
        transfer_id: TransferId,
        frame_type: FrameType,
    ) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Disconnected);
        }
        self.occupy_link().await;

        let index = self.frames_seen;
        self.frames_seen += 1;
        if self.fail_frame_at.is_some_and(|at| index >= at) {
            warn!("VirtualDevice: injected failure on frame write #{}", index);
            return Err(DeviceError::SendFailed { reason: format!("injected failure on frame #{index}") });
        }

        self.record(WireRecord::Frame {
            transfer_id: transfer_id.get(),
            frame_type,
            len: payload.len(),
        });
        Ok(())
    }

    async fn send_command(&mut self, opcode: u8, args: Bytes) -> Result<CommandResponse, DeviceError> {
        if self.closed {
            return Err(DeviceError::Disconnected);
        }
        self.occupy_link().await;

        if self.failing.contains(&opcode) {
            return Err(DeviceError::SendFailed { reason: format!("injected failure on opcode 0x{opcode:02x}") });
        }
        let command = DeviceCommand::decode(opcode, &args)?;
        self.record(WireRecord::Command(command));
        debug!("VirtualDevice: {:?}", command);

        Ok(match self.rejected.get(&opcode) {
            Some(&status) => CommandResponse::with_status(status),
            None => CommandResponse::ok(),
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.record(WireRecord::Closed);
        }
    }
}

/// Read side of a [`VirtualDevice`]'s wire log.
#[derive(Clone)]
pub struct VirtualDeviceProbe {
    log: WireLog,
}

impl VirtualDeviceProbe {
    pub fn timed_records(&self) -> Vec<(Instant, WireRecord)> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn records(&self) -> Vec<WireRecord> {
        self.timed_records().into_iter().map(|(_, r)| r).collect()
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                WireRecord::Command(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Transfer ids of the frames written, in wire order.
    pub fn frame_ids(&self) -> Vec<u8> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                WireRecord::Frame { transfer_id, .. } => Some(transfer_id),
                _ => None,
            })
            .collect()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::Heartbeat { .. }))
            .count()
    }

    pub fn count_command(&self, command: DeviceCommand) -> usize {
        self.commands().iter().filter(|&&c| c == command).count()
    }
}
