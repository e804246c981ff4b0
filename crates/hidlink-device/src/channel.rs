use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{DeviceError, FrameType, TransferId};

use crate::command::CommandResponse;

// MARK: - DeviceChannel trait

/// Transport to one physical display.
///
/// Packetizing payloads into HID reports is the implementation's business;
/// the pipeline only hands over whole frames and control commands. Methods
/// take `&mut self`: a [`DeviceHandle`](crate::DeviceHandle) keeps the
/// channel behind a lock, so one write finishes before the next starts.
///
/// Implementations:
/// - [`VirtualDevice`](crate::VirtualDevice): in-process simulated panel
#[async_trait]
pub trait DeviceChannel: Send {
    /// Write one frame payload into the device slot named by `transfer_id`.
    async fn send_frame(
        &mut self,
        payload: Bytes,
        transfer_id: TransferId,
        frame_type: FrameType,
    ) -> Result<(), DeviceError>;

    /// Send a control command and wait for the device's response.
    async fn send_command(&mut self, opcode: u8, args: Bytes) -> Result<CommandResponse, DeviceError>;

    /// Release the underlying transport. Later writes fail with
    /// [`DeviceError::Disconnected`].
    async fn close(&mut self);
}
