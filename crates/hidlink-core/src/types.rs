use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::transfer_id::TransferId;

// MARK: - DeviceId

/// Stable identity of one attached display (serial number or bus path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// MARK: - DeviceInfo

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            vendor_id,
            product_id,
        }
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:04x}:{:04x} {})", self.name, self.vendor_id, self.product_id, self.id)
    }
}

// MARK: - Rotation

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[serde(alias = "0")]
    Deg0,
    #[serde(alias = "90")]
    Deg90,
    #[serde(alias = "180")]
    Deg180,
    #[serde(alias = "270")]
    Deg270,
}

impl Rotation {
    /// Number of clockwise quarter turns, as the device firmware expects it.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    pub fn from_quarter_turns(turns: u8) -> Option<Self> {
        match turns {
            0 => Some(Self::Deg0),
            1 => Some(Self::Deg90),
            2 => Some(Self::Deg180),
            3 => Some(Self::Deg270),
            _ => None,
        }
    }
}

// MARK: - CycleCount

/// How many passes over the frame source a streaming run makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleCount {
    Fixed(u32),
    /// Loop until cancelled.
    Infinite,
}

impl CycleCount {
    /// `true` while `cycle` (zero-based) is still inside the requested range.
    pub fn includes(self, cycle: u64) -> bool {
        match self {
            Self::Fixed(n) => cycle < n as u64,
            Self::Infinite => true,
        }
    }
}

impl Default for CycleCount {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl std::fmt::Display for CycleCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Infinite => write!(f, "∞"),
        }
    }
}

// MARK: - FrameType

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Still image payload (PNG, BMP, GIF ...), decoded on the device.
    Image,
    /// Baseline JPEG payload.
    Jpeg,
}

impl FrameType {
    /// Type tag byte passed to the device channel alongside the payload.
    pub fn tag(self) -> u8 {
        match self {
            Self::Image => 0x01,
            Self::Jpeg => 0x02,
        }
    }
}

// MARK: - FrameOrigin

/// Where a frame came from, so the UI can mirror what the device shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrigin {
    File(PathBuf),
    Video { path: PathBuf, frame_index: u64 },
    Memory { label: String },
}

impl std::fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Video { path, frame_index } => write!(f, "{}#{}", path.display(), frame_index),
            Self::Memory { label } => f.write_str(label),
        }
    }
}

// MARK: - FrameEnvelope

/// One frame ready for the wire. Built once by the session, never mutated.
#[derive(Debug, Clone)]
pub struct FrameEnvelope {
    pub payload: Bytes,
    pub transfer_id: TransferId,
    pub frame_type: FrameType,
    /// Position of the frame within the whole run (all cycles).
    pub sequence_index: u64,
    pub cycle: u64,
    pub source_timestamp: Option<Duration>,
    pub origin: FrameOrigin,
}

// MARK: - SessionState

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Preparing,
    Active,
    Draining,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// MARK: - Events

/// The device is estimated to have started showing this frame.
#[derive(Debug, Clone)]
pub struct DisplayEvent {
    pub device: DeviceId,
    pub sequence_index: u64,
    pub transfer_id: TransferId,
    pub cycle: u64,
    pub origin: FrameOrigin,
    pub payload: Bytes,
}

impl DisplayEvent {
    pub fn from_envelope(device: DeviceId, envelope: FrameEnvelope) -> Self {
        Self {
            device,
            sequence_index: envelope.sequence_index,
            transfer_id: envelope.transfer_id,
            cycle: envelope.cycle,
            origin: envelope.origin,
            payload: envelope.payload,
        }
    }
}

/// Messages the pipeline posts to the UI layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    FrameDisplaying(DisplayEvent),
    StateChanged { device: DeviceId, state: SessionState },
}
