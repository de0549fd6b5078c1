use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, trace, warn};

use crate::config::{Alert, Config, PagerDuty, Webhook};
use crate::discord::DiscordProvider;

/// What kind of entity an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Machine,
    Service,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Machine => "machine",
            AlertCategory::Service => "service",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    High,
    Panic,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::High => "high",
            Severity::Panic => "panic",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification back-end.
///
/// Implementations own their transport, retries and backoff. The dispatcher only logs failures.
#[async_trait]
pub trait AlertProvider: Send + Sync {
    async fn send(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Routes alerts to the provider bound to their severity tier.
///
/// `Low` goes to the low slot, `High` and `Panic` to the high slot. An empty slot is a no-op.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    low: Option<Arc<dyn AlertProvider>>,
    high: Option<Arc<dyn AlertProvider>>,
}

impl fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("low", &self.low.as_ref().map(|p| p.name().to_string()))
            .field("high", &self.high.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl AlertDispatcher {
    pub fn new(
        low: Option<Arc<dyn AlertProvider>>,
        high: Option<Arc<dyn AlertProvider>>,
    ) -> Self {
        Self { low, high }
    }

    /// Dispatcher with both slots empty
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build the providers configured for each tier. With `no_alert` both slots stay empty.
    pub fn from_config(config: &Config, no_alert: bool) -> anyhow::Result<Self> {
        if no_alert {
            warn!("alerting is disabled by the --no-alert flag");
            return Ok(Self::disabled());
        }

        let client = http_client()?;

        let low = config
            .low_alert_provider
            .as_ref()
            .map(|alert| build_provider(alert, client.clone()));
        if low.is_none() {
            warn!("low alert provider is not configured");
        }

        let high = config
            .high_alert_provider
            .as_ref()
            .map(|alert| build_provider(alert, client.clone()));
        if high.is_none() {
            warn!("high alert provider is not configured");
        }

        Ok(Self::new(low, high))
    }

    fn provider_for(&self, severity: Severity) -> Option<&Arc<dyn AlertProvider>> {
        match severity {
            Severity::Low => self.low.as_ref(),
            Severity::High | Severity::Panic => self.high.as_ref(),
        }
    }

    /// Deliver an alert and wait for the provider. Failures are logged, never returned.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, category: AlertCategory, name: &str, severity: Severity) {
        trace!("alerting {category} {name} {severity}");

        let Some(provider) = self.provider_for(severity) else {
            warn!("no provider configured for {severity} alerts, dropping alert for {name}");
            return;
        };

        info!("sending {severity} alert to provider {}", provider.name());

        if let Err(e) = provider.send(category, name, severity).await {
            error!(
                "failed to send {severity} alert through {}: {e:#}",
                provider.name()
            );
        }
    }

    /// Fire-and-forget variant of [`AlertDispatcher::dispatch`] for the monitoring hot path
    pub fn notify(&self, category: AlertCategory, name: &str, severity: Severity) {
        let dispatcher = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { dispatcher.dispatch(category, &name, severity).await });
    }
}

/// Shared HTTP client for all providers
pub fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

fn build_provider(alert: &Alert, client: Client) -> Arc<dyn AlertProvider> {
    match alert {
        Alert::Discord(discord) => {
            trace!("crafting Discord provider");
            Arc::new(DiscordProvider::new(client, discord.clone()))
        }
        Alert::Webhook(webhook) => {
            trace!("crafting webhook provider");
            Arc::new(WebhookProvider::new(client, webhook.clone()))
        }
        Alert::Pagerduty(pagerduty) => {
            trace!("crafting PagerDuty provider");
            Arc::new(PagerDutyProvider::new(client, pagerduty.clone()))
        }
    }
}

/// Human readable one-liner shared by the providers
pub fn alert_message(category: AlertCategory, name: &str, severity: Severity) -> String {
    let entity = match category {
        AlertCategory::Machine => "Machine",
        AlertCategory::Service => "Service",
    };
    format!("{entity} {name} alert level is {severity}")
}

/// Plain JSON POST to an arbitrary endpoint
#[derive(Debug, Clone)]
pub struct WebhookProvider {
    client: Client,
    webhook: Webhook,
}

impl WebhookProvider {
    pub fn new(client: Client, webhook: Webhook) -> Self {
        Self { client, webhook }
    }
}

#[async_trait]
impl AlertProvider for WebhookProvider {
    #[instrument(skip(self))]
    async fn send(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        let payload = json!({
            "category": category,
            "name": name,
            "severity": severity,
            "message": alert_message(category, name, severity),
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.webhook.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook request")?;

        if !response.status().is_success() {
            anyhow::bail!("webhook responded with status {}", response.status());
        }

        info!("successfully sent webhook alert");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// PagerDuty Events API v2 (`trigger` events only)
#[derive(Debug, Clone)]
pub struct PagerDutyProvider {
    client: Client,
    config: PagerDuty,
}

impl PagerDutyProvider {
    pub fn new(client: Client, config: PagerDuty) -> Self {
        Self { client, config }
    }

    fn event_severity(severity: Severity) -> &'static str {
        match severity {
            Severity::Low => "warning",
            Severity::High | Severity::Panic => "critical",
        }
    }
}

#[async_trait]
impl AlertProvider for PagerDutyProvider {
    #[instrument(skip(self))]
    async fn send(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        let event = json!({
            "routing_key": self.config.integration_key,
            "event_action": "trigger",
            "dedup_key": format!("{category}-{name}-{severity}"),
            "payload": {
                "summary": format!("Sentinel - {}", alert_message(category, name, severity)),
                "source": name,
                "severity": Self::event_severity(severity),
                "timestamp": Utc::now().to_rfc3339(),
            }
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&event)
            .send()
            .await
            .context("failed to send PagerDuty event")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("PagerDuty responded with status {status}: {body}");
        }

        info!("event sent to PagerDuty successfully");
        Ok(())
    }

    fn name(&self) -> &str {
        "pagerduty"
    }
}
