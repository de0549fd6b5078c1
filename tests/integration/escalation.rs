//! Machine escalation driven by inactivity ticks

use fleet_sentinel::{
    ProbeStatus,
    actors::{messages::Report, registry::RegistryHandle},
    alerts::Severity,
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

async fn status_of(registry: &RegistryHandle, machine: &str) -> Option<ProbeStatus> {
    registry
        .snapshot()
        .await
        .unwrap()
        .get(machine)
        .map(|probe| probe.status)
}

#[tokio::test(start_paused = true)]
async fn test_silent_machine_walks_the_ladder() {
    let (provider, alerts) = recording_dispatcher();
    let registry = RegistryHandle::spawn(create_test_settings(2, 3, 5), alerts, None);

    registry
        .submit(Report::new("web1", services(&[("nginx", "pass")])))
        .await
        .unwrap();
    settle().await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Normal));

    let half = DELAY / 2;

    tokio::time::sleep(DELAY + half).await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Degraded));

    tokio::time::sleep(DELAY).await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Failed));

    tokio::time::sleep(DELAY * 3).await;
    settle().await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::AlertedLow));
    assert_eq!(provider.calls(), vec![machine_alert("web1", Severity::Low)]);

    tokio::time::sleep(DELAY * 5).await;
    settle().await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::AlertedHigh));
    assert_eq!(
        provider.calls(),
        vec![
            machine_alert("web1", Severity::Low),
            machine_alert("web1", Severity::High),
        ]
    );

    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_report_brings_machine_back_to_normal() {
    let (provider, alerts) = recording_dispatcher();
    let registry = RegistryHandle::spawn(create_test_settings(2, 3, 5), alerts, None);

    registry
        .submit(Report::new("web1", services(&[])))
        .await
        .unwrap();
    tokio::time::sleep(DELAY * 6).await;
    settle().await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::AlertedLow));

    registry
        .submit(Report::new("web1", services(&[("nginx", "pass")])))
        .await
        .unwrap();

    let state = registry.probe_state("web1").await.unwrap().unwrap();
    assert_eq!(state.status, ProbeStatus::Normal);
    assert_eq!(state.counter, 0);

    // A full new climb is needed before the next low alert
    tokio::time::sleep(DELAY * 4 + DELAY / 2).await;
    settle().await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Failed));
    assert_eq!(provider.calls(), vec![machine_alert("web1", Severity::Low)]);

    tokio::time::sleep(DELAY).await;
    settle().await;
    assert_eq!(
        provider.calls(),
        vec![
            machine_alert("web1", Severity::Low),
            machine_alert("web1", Severity::Low),
        ]
    );

    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deleted_machine_stops_escalating() {
    let (provider, alerts) = recording_dispatcher();
    let registry = RegistryHandle::spawn(create_test_settings(2, 3, 5), alerts, None);

    registry
        .submit(Report::new("web1", services(&[])))
        .await
        .unwrap();
    tokio::time::sleep(DELAY * 2 + DELAY / 2).await;
    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Failed));

    registry.submit(Report::delete("web1")).await.unwrap();
    assert_eq!(status_of(&registry, "web1").await, None);

    tokio::time::sleep(DELAY * 20).await;
    settle().await;

    assert!(provider.calls().is_empty());
    registry.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_regular_reporter_is_never_alerted() {
    let (provider, alerts) = recording_dispatcher();
    let registry = RegistryHandle::spawn(create_test_settings(1, 1, 1), alerts, None);

    for _ in 0..30 {
        registry
            .submit(Report::new("web1", services(&[("nginx", "pass")])))
            .await
            .unwrap();
        tokio::time::sleep(DELAY / 2).await;
    }

    assert_eq!(status_of(&registry, "web1").await, Some(ProbeStatus::Normal));
    assert!(provider.calls().is_empty());

    registry.shutdown().await.unwrap();
}
