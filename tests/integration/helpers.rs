//! Helper functions for integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_sentinel::{
    alerts::{AlertCategory, AlertDispatcher, AlertProvider, Severity},
    config::{MonitoringSettings, Thresholds},
};

pub const DELAY: Duration = Duration::from_secs(10);

pub type AlertCall = (AlertCategory, String, Severity);

/// Provider recording every alert it receives
#[derive(Debug, Default)]
pub struct RecordingProvider {
    calls: Mutex<Vec<AlertCall>>,
    fail: bool,
}

impl RecordingProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AlertCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertProvider for RecordingProvider {
    async fn send(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((category, name.to_string(), severity));
        if self.fail {
            anyhow::bail!("provider unavailable");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Same recorder bound to both tiers, so calls keep their relative order
pub fn recording_dispatcher() -> (Arc<RecordingProvider>, AlertDispatcher) {
    let provider = Arc::new(RecordingProvider::default());
    let dispatcher = AlertDispatcher::new(
        Some(provider.clone() as Arc<dyn AlertProvider>),
        Some(provider.clone() as Arc<dyn AlertProvider>),
    );
    (provider, dispatcher)
}

pub fn create_test_settings(
    degraded_to_failed: usize,
    failed_to_alerted_low: usize,
    alerted_low_to_alerted_high: usize,
) -> MonitoringSettings {
    MonitoringSettings {
        inactivity_delay: DELAY,
        thresholds: Thresholds {
            degraded_to_failed,
            failed_to_alerted_low,
            alerted_low_to_alerted_high,
        },
        dashboard_interval: None,
    }
}

pub fn services(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(name, status)| (name.to_string(), status.to_string()))
        .collect()
}

/// Let spawned tasks run on a paused clock without reaching the next inactivity tick
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn machine_alert(name: &str, severity: Severity) -> AlertCall {
    (AlertCategory::Machine, name.to_string(), severity)
}

pub fn service_alert(tag: &str, severity: Severity) -> AlertCall {
    (AlertCategory::Service, tag.to_string(), severity)
}
