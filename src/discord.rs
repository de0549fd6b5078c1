use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::alerts::{AlertCategory, AlertProvider, Severity, alert_message};
use crate::config::Discord;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts alerts to a Discord webhook as a single embed
#[derive(Debug, Clone)]
pub struct DiscordProvider {
    client: Client,
    discord: Discord,
}

impl DiscordProvider {
    pub fn new(client: Client, discord: Discord) -> Self {
        Self { client, discord }
    }

    pub fn build_alert_embed(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> Embed {
        let (title, color) = match severity {
            Severity::Low => ("⚠️ Low Severity Alert", 15105570),      // Orange
            Severity::High => ("🔥 High Severity Alert", 15158332),    // Red
            Severity::Panic => ("🚨 Panic Alert", 10038562),           // Dark red
        };

        let entity = match category {
            AlertCategory::Machine => "🖥️ Machine",
            AlertCategory::Service => "⚙️ Service",
        };

        Embed {
            title: Some(title.to_string()),
            description: Some(alert_message(category, name, severity)),
            color: Some(color),
            fields: vec![
                EmbedField {
                    name: entity.to_string(),
                    value: format!("`{name}`"),
                    inline: true,
                },
                EmbedField {
                    name: "📊 Severity".to_string(),
                    value: severity.to_string(),
                    inline: true,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("fleet-sentinel | {category}"),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn build_message(&self, category: AlertCategory, name: &str, severity: Severity) -> Message {
        let mut message_builder =
            MessageBuilder::new().add_embed(self.build_alert_embed(category, name, severity));
        if let Some(user_id) = &self.discord.user_id {
            message_builder = message_builder.content(format!("🔴 `{name}` <@{user_id}>"));
        }
        message_builder.build()
    }
}

#[async_trait]
impl AlertProvider for DiscordProvider {
    #[instrument(skip(self))]
    async fn send(
        &self,
        category: AlertCategory,
        name: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        let message = self.build_message(category, name, severity);

        let response = self
            .client
            .post(&self.discord.url)
            .json(&message)
            .send()
            .await
            .context("failed to send Discord message")?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error_text) = response.text().await {
                error!("Discord API error response: {error_text}");
            }
            anyhow::bail!("Discord message failed with status: {status}");
        }

        info!("successfully sent Discord message");
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}
