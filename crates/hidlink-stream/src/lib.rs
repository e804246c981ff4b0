//! hidlink-stream: drives frame sources onto devices.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ─► StreamingSession ─► DeviceHandle ─► DeviceChannel
//!                  │  TransferIdAllocator
//!                  │  DeviceDisplayBuffer ─► SyncEvent::FrameDisplaying ─► UI
//!                  │  FramePacer
//!                  └─ KeepAliveScheduler (own task)
//!
//! DeviceFleetCoordinator: one StreamingSession task per device
//! ```

pub mod fleet;
pub mod pacing;
pub mod session;

pub use fleet::{DeviceFleetCoordinator, DeviceRunResult, FleetReport, DEFAULT_TEARDOWN_GRACE};
pub use pacing::FramePacer;
pub use session::{SessionOutcome, SessionReport, StreamingSession};
