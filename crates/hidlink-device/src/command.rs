//! Control commands and their `(opcode, args)` encoding.
//!
//! # Argument layout
//!
//! ```text
//! opcode  command               args
//! 0x10    Wake                  -
//! 0x11    Sleep                 -
//! 0x20    SetRealtimeMode       [0]    u8     0 = off, 1 = on
//! 0x21    SetBrightness         [0]    u8     0..=100 percent
//! 0x22    SetRotation           [0]    u8     clockwise quarter turns
//! 0x23    SetKeepAliveTimeout   [0..2] u16 BE watchdog seconds
//! 0x30    Heartbeat             [0..8] u64 BE host unix time (ms)
//! ```
//!
//! How the pair is framed into HID reports is up to the [`DeviceChannel`]
//! implementation.
//!
//! [`DeviceChannel`]: crate::DeviceChannel

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hidlink_core::{DeviceError, Rotation};

// ── Opcodes ───────────────────────────────────────────────────────────────────

pub mod opcode {
    pub const WAKE: u8 = 0x10;
    pub const SLEEP: u8 = 0x11;
    pub const SET_REALTIME_MODE: u8 = 0x20;
    pub const SET_BRIGHTNESS: u8 = 0x21;
    pub const SET_ROTATION: u8 = 0x22;
    pub const SET_KEEP_ALIVE_TIMEOUT: u8 = 0x23;
    pub const HEARTBEAT: u8 = 0x30;
}

// ── DeviceCommand ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Wake,
    Sleep,
    SetRealtimeMode(bool),
    SetBrightness(u8),
    SetRotation(Rotation),
    /// Watchdog timeout in whole seconds.
    SetKeepAliveTimeout(u16),
    Heartbeat { timestamp_ms: u64 },
}

impl DeviceCommand {
    /// Heartbeat stamped with the current wall-clock time.
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat { timestamp_ms: ts_ms() }
    }

    /// Saturates at `u16::MAX` seconds.
    pub fn keep_alive_timeout(timeout: Duration) -> Self {
        Self::SetKeepAliveTimeout(timeout.as_secs().min(u16::MAX as u64) as u16)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Wake => opcode::WAKE,
            Self::Sleep => opcode::SLEEP,
            Self::SetRealtimeMode(_) => opcode::SET_REALTIME_MODE,
            Self::SetBrightness(_) => opcode::SET_BRIGHTNESS,
            Self::SetRotation(_) => opcode::SET_ROTATION,
            Self::SetKeepAliveTimeout(_) => opcode::SET_KEEP_ALIVE_TIMEOUT,
            Self::Heartbeat { .. } => opcode::HEARTBEAT,
        }
    }

    /// Short name used in logs and setup errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::Sleep => "sleep",
            Self::SetRealtimeMode(true) => "enable real-time mode",
            Self::SetRealtimeMode(false) => "disable real-time mode",
            Self::SetBrightness(_) => "set brightness",
            Self::SetRotation(_) => "set rotation",
            Self::SetKeepAliveTimeout(_) => "set keep-alive timeout",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn encode_args(&self) -> Bytes {
        let mut args = BytesMut::with_capacity(8);
        match *self {
            Self::Wake | Self::Sleep => {}
            Self::SetRealtimeMode(on) => args.put_u8(on as u8),
            Self::SetBrightness(percent) => args.put_u8(percent.min(100)),
            Self::SetRotation(rotation) => args.put_u8(rotation.quarter_turns()),
            Self::SetKeepAliveTimeout(secs) => args.put_u16(secs),
            Self::Heartbeat { timestamp_ms } => args.put_u64(timestamp_ms),
        }
        args.freeze()
    }

    /// Inverse of [`opcode`](Self::opcode) + [`encode_args`](Self::encode_args).
    pub fn decode(op: u8, mut args: &[u8]) -> Result<Self, DeviceError> {
        let malformed = |reason: &str| DeviceError::Malformed { opcode: op, reason: reason.to_owned() };
        let need = |len: usize, args: &[u8]| {
            if args.len() == len {
                Ok(())
            } else {
                Err(malformed(&format!("expected {} arg bytes, got {}", len, args.len())))
            }
        };

        let cmd = match op {
            opcode::WAKE => {
                need(0, args)?;
                Self::Wake
            }
            opcode::SLEEP => {
                need(0, args)?;
                Self::Sleep
            }
            opcode::SET_REALTIME_MODE => {
                need(1, args)?;
                match args.get_u8() {
                    0 => Self::SetRealtimeMode(false),
                    1 => Self::SetRealtimeMode(true),
                    _ => return Err(malformed("real-time flag must be 0 or 1")),
                }
            }
            opcode::SET_BRIGHTNESS => {
                need(1, args)?;
                let percent = args.get_u8();
                if percent > 100 {
                    return Err(malformed("brightness above 100"));
                }
                Self::SetBrightness(percent)
            }
            opcode::SET_ROTATION => {
                need(1, args)?;
                let rotation = Rotation::from_quarter_turns(args.get_u8())
                    .ok_or_else(|| malformed("rotation out of range"))?;
                Self::SetRotation(rotation)
            }
            opcode::SET_KEEP_ALIVE_TIMEOUT => {
                need(2, args)?;
                Self::SetKeepAliveTimeout(args.get_u16())
            }
            opcode::HEARTBEAT => {
                need(8, args)?;
                Self::Heartbeat { timestamp_ms: args.get_u64() }
            }
            _ => return Err(malformed("unknown opcode")),
        };
        Ok(cmd)
    }
}

// ── CommandResponse ───────────────────────────────────────────────────────────

/// Status byte + optional payload returned by the device for a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: u8,
    pub payload: Bytes,
}

impl CommandResponse {
    pub const STATUS_OK: u8 = 0x00;

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_status(status: u8) -> Self {
        Self { status, payload: Bytes::new() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Self::STATUS_OK
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ts_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
