use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hidlink_core::DeviceId;
use tokio::sync::broadcast;
use tracing::info;

use crate::handle::DeviceHandle;

/// Attach / detach notifications for the device list UI.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Attached(DeviceId),
    Detached(DeviceId),
}

/// Currently attached displays, keyed by id.
///
/// Fleet runs take a [`snapshot`](Self::snapshot) at start; devices attached
/// or detached afterwards do not change an in-flight run.
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<Mutex<BTreeMap<DeviceId, DeviceHandle>>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self { devices: Arc::default(), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Register a newly detected device. Replaces any stale handle with the same id.
    pub fn attach(&self, device: DeviceHandle) {
        let id = device.id().clone();
        info!("Device[{}] attached: {}", id, device.info());
        self.lock().insert(id.clone(), device);
        let _ = self.events.send(DeviceEvent::Attached(id));
    }

    /// Forget a device. The handle is returned so the caller can disconnect it;
    /// sessions still holding clones keep running until their writes fail.
    pub fn detach(&self, id: &DeviceId) -> Option<DeviceHandle> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            info!("Device[{}] detached", id);
            let _ = self.events.send(DeviceEvent::Detached(id.clone()));
        }
        removed
    }

    /// Detach and disconnect.
    pub async fn disconnect(&self, id: &DeviceId) -> bool {
        match self.detach(id) {
            Some(device) => {
                device.disconnect().await;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<DeviceHandle> {
        self.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<DeviceHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceId, DeviceHandle>> {
        self.devices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_device::VirtualDevice;
    use hidlink_core::DeviceInfo;

    fn panel(id: &str) -> DeviceHandle {
        let (channel, _probe) = VirtualDevice::new();
        DeviceHandle::new(DeviceInfo::new(id, "Panel", 0x0416, 0x5302), channel)
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_changes() {
        let registry = DeviceRegistry::new();
        let mut events = registry.subscribe();
        registry.attach(panel("b"));
        registry.attach(panel("a"));

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.iter().map(|d| d.id().as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        assert!(registry.disconnect(&DeviceId::new("a")).await);
        registry.attach(panel("c"));
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot[0].is_connected());
        assert_eq!(registry.len(), 2);

        assert!(matches!(events.recv().await, Ok(DeviceEvent::Attached(id)) if id.as_str() == "b"));
        assert!(matches!(events.recv().await, Ok(DeviceEvent::Attached(id)) if id.as_str() == "a"));
        assert!(matches!(events.recv().await, Ok(DeviceEvent::Detached(id)) if id.as_str() == "a"));
    }

    #[test]
    fn detaching_unknown_device_is_none() {
        let registry = DeviceRegistry::default();
        assert!(registry.detach(&DeviceId::new("ghost")).is_none());
        assert!(registry.is_empty());
    }
}
