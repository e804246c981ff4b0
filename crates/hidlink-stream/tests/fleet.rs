//! Fleet fan-out over virtual panels, one of them too slow for the deadline.

use std::time::Duration;

use hidlink_core::{DeviceId, DeviceInfo, SyncConfig, SyncEvent};
use hidlink_device::{DeviceCommand, DeviceHandle, DeviceRegistry, VirtualDevice, VirtualDeviceProbe};
use hidlink_source::MemoryFrameSource;
use hidlink_stream::{DeviceFleetCoordinator, DeviceRunResult};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn attach(registry: &DeviceRegistry, id: &str, latency: Duration) -> VirtualDeviceProbe {
    let (channel, probe) = VirtualDevice::new();
    let channel = channel.with_write_latency(latency);
    registry.attach(DeviceHandle::new(DeviceInfo::new(id, "Panel", 0x0416, 0x5302), channel));
    probe
}

fn fleet_config() -> SyncConfig {
    SyncConfig { frame_delay_ms: Some(100), fleet_timeout_secs: Some(2), ..SyncConfig::default() }
}

#[tokio::test(start_paused = true)]
async fn slow_device_times_out_others_complete() {
    let registry = DeviceRegistry::new();
    let fast_a = attach(&registry, "fast-a", Duration::ZERO);
    let fast_b = attach(&registry, "fast-b", Duration::ZERO);
    // Every write holds the link for a second: setup alone outlives the deadline.
    let slow = attach(&registry, "slow", Duration::from_secs(1));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let fleet = DeviceFleetCoordinator::new().with_teardown_grace(Duration::from_secs(5));
    let start = Instant::now();

    let report = fleet
        .stream_to_all(registry.snapshot(), &fleet_config(), Some(tx), |_device| async {
            MemoryFrameSource::numbered(5, 8)
        })
        .await;

    let outcomes = report.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[&DeviceId::new("fast-a")]);
    assert!(outcomes[&DeviceId::new("fast-b")]);
    assert!(!outcomes[&DeviceId::new("slow")]);
    assert!(matches!(report.get(&DeviceId::new("slow")), Some(DeviceRunResult::TimedOut)));
    assert_eq!(report.summary(), "2 of 3 devices succeeded");

    // The slow panel was cancelled at the deadline and still tore down once
    // within the grace period.
    assert!(start.elapsed() < Duration::from_secs(7));
    assert!(slow.frame_ids().is_empty());
    assert_eq!(
        slow.commands(),
        vec![
            DeviceCommand::SetRealtimeMode(true),
            DeviceCommand::SetBrightness(100),
            DeviceCommand::SetKeepAliveTimeout(60),
            DeviceCommand::SetRealtimeMode(false),
        ]
    );

    for probe in [&fast_a, &fast_b] {
        assert_eq!(probe.frame_ids(), vec![4, 5, 6, 7, 8]);
    }

    let mut displayed = 0;
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::FrameDisplaying(e) = event {
            assert_ne!(e.device.as_str(), "slow");
            displayed += 1;
        }
    }
    assert_eq!(displayed, 10);
}

#[tokio::test(start_paused = true)]
async fn unavailable_source_fails_every_device_without_traffic() {
    let registry = DeviceRegistry::new();
    let probes: Vec<_> = ["a", "b"].iter().map(|id| attach(&registry, id, Duration::ZERO)).collect();

    let report = DeviceFleetCoordinator::new()
        .stream_to_all(registry.snapshot(), &SyncConfig::default(), None, |_device| async {
            MemoryFrameSource::new(Vec::new())
        })
        .await;

    assert_eq!(report.summary(), "0 of 2 devices succeeded");
    for probe in probes {
        assert!(probe.records().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn snapshot_fixes_the_device_set() {
    let registry = DeviceRegistry::new();
    attach(&registry, "a", Duration::ZERO);
    let devices = registry.snapshot();
    attach(&registry, "late", Duration::ZERO);

    let report = DeviceFleetCoordinator::new()
        .stream_to_all(devices, &fleet_config(), None, |_device| async {
            MemoryFrameSource::numbered(2, 4)
        })
        .await;

    assert_eq!(report.len(), 1);
    assert!(report.get(&DeviceId::new("late")).is_none());
    assert!(report.all_succeeded());
}
