//! Many machines reporting through one registry

use fleet_sentinel::{
    ProbeStatus,
    actors::{messages::Report, registry::RegistryHandle},
    alerts::{AlertDispatcher, Severity},
};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_snapshot_keeps_registration_order() {
    let registry =
        RegistryHandle::spawn(create_test_settings(2, 3, 5), AlertDispatcher::disabled(), None);

    let machines: Vec<String> = (0..25).map(|i| format!("node-{i:02}")).collect();
    for round in 0..3 {
        for machine in machines.iter().skip(round) {
            registry
                .submit(Report::new(machine.as_str(), services(&[("agent", "pass")])))
                .await
                .unwrap();
        }
    }

    let snapshot = registry.snapshot().await.unwrap();
    let names: Vec<&str> = snapshot.probes.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, machines.iter().map(String::as_str).collect::<Vec<_>>());

    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submitters_keep_per_machine_history() {
    let registry =
        RegistryHandle::spawn(create_test_settings(2, 3, 5), AlertDispatcher::disabled(), None);

    let submitters = (0..10).map(|i| {
        let ingress = registry.ingress();
        async move {
            let machine = format!("web{i}");
            for _ in 0..20 {
                ingress
                    .send(Report::new(machine.as_str(), services(&[("nginx", "pass")])))
                    .await
                    .unwrap();
            }
        }
    });
    join_all(submitters).await;

    for i in 0..10 {
        let state = registry
            .probe_state(&format!("web{i}"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.series_size, 20);
        assert_eq!(state.status, ProbeStatus::Normal);
    }

    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_one_silent_machine_does_not_affect_others() {
    let (provider, alerts) = recording_dispatcher();
    let registry = RegistryHandle::spawn(create_test_settings(2, 3, 5), alerts, None);

    registry
        .submit(Report::new("quiet", services(&[])))
        .await
        .unwrap();

    for _ in 0..12 {
        for machine in ["web1", "web2"] {
            registry
                .submit(Report::new(machine, services(&[("nginx", "pass")])))
                .await
                .unwrap();
        }
        tokio::time::sleep(DELAY / 2).await;
    }
    settle().await;

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(
        snapshot.get("quiet").map(|p| p.status),
        Some(ProbeStatus::AlertedLow)
    );
    assert_eq!(snapshot.get("web1").map(|p| p.status), Some(ProbeStatus::Normal));
    assert_eq!(snapshot.get("web2").map(|p| p.status), Some(ProbeStatus::Normal));
    assert_eq!(provider.calls(), vec![machine_alert("quiet", Severity::Low)]);

    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dashboard_receives_periodic_snapshots() {
    let (dashboard_tx, mut dashboard_rx) = broadcast::channel(16);
    let mut settings = create_test_settings(2, 3, 5);
    settings.dashboard_interval = Some(std::time::Duration::from_secs(5));

    let registry = RegistryHandle::spawn(settings, AlertDispatcher::disabled(), Some(dashboard_tx));

    registry
        .submit(Report::new("web1", services(&[])))
        .await
        .unwrap();

    let first = dashboard_rx.recv().await.unwrap();
    assert_eq!(first.get("web1").map(|p| p.status), Some(ProbeStatus::Normal));

    // 5s, 10s (first tick lands at 10s), then 15s
    dashboard_rx.recv().await.unwrap();
    let third = dashboard_rx.recv().await.unwrap();
    assert_eq!(third.get("web1").map(|p| p.status), Some(ProbeStatus::Degraded));

    registry.shutdown().await.unwrap();
}
