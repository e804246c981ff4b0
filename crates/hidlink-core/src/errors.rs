use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HidLinkError {
    #[error("Frame source unavailable ({path}): {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Device setup failed during {step}: {source}")]
    DeviceSetupFailed {
        step: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("Device write failed at sequence {sequence_index}: {source}")]
    DeviceWriteFailed {
        sequence_index: u64,
        #[source]
        source: DeviceError,
    },

    #[error("Streaming cancelled")]
    Cancelled,

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Device {device} is already driven by another session")]
    DeviceBusy { device: String },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HidLinkError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable { path: path.into(), reason: reason.into() }
    }

    /// `true` for the cooperative-stop case, which callers report apart from failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Decoder backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("GStreamer pipeline error: {0}")]
    GStreamerPipeline(String),

    #[error("Failed to decode frame: {reason}")]
    DecodeFailed { reason: String },

    #[error("Decoder not started")]
    NotStarted,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("Command 0x{opcode:02x} rejected with status {status}")]
    Rejected { opcode: u8, status: u8 },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Malformed command 0x{opcode:02x}: {reason}")]
    Malformed { opcode: u8, reason: String },
}
