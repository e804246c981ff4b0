pub mod config;
pub mod display_buffer;
pub mod errors;
pub mod transfer_id;
pub mod types;

pub use config::{SyncConfig, DEFAULT_FRAME_DELAY, HEARTBEAT_INTERVAL};
pub use display_buffer::{DeviceDisplayBuffer, DEFAULT_BUFFER_DEPTH};
pub use errors::{DecoderError, DeviceError, HidLinkError};
pub use transfer_id::{TransferId, TransferIdAllocator};
pub use types::*;
