//! hidlink-device: host side of one USB-HID display.
//!
//! # Architecture
//!
//! ```text
//! StreamingSession ─ send_frame ─┐
//!                                ├─► DeviceHandle ─(Mutex)─► dyn DeviceChannel ─► HID
//! KeepAliveScheduler ─ command ──┘
//! ```
//!
//! The channel (report framing, HID I/O) is a collaborator; this crate owns
//! everything above it: the control command codec, write serialization, the
//! session claim, the heartbeat and the attached-device registry.

pub mod channel;
pub mod command;
pub mod handle;
pub mod keepalive;
pub mod registry;
pub mod virtual_device;

pub use channel::DeviceChannel;
pub use command::{opcode, CommandResponse, DeviceCommand};
pub use handle::{DeviceHandle, SessionClaim};
pub use keepalive::KeepAliveScheduler;
pub use registry::{DeviceEvent, DeviceRegistry};
pub use virtual_device::{VirtualDevice, VirtualDeviceProbe, WireRecord};
