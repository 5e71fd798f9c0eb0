use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::{AlertChannel, Notifier};
use crate::config::NotifyConfig;
use crate::errors::NotifyError;

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct DirectMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Posts alerts to chat webhooks and direct messages to a bot chat.
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl WebhookNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn webhook(&self, channel: AlertChannel) -> Option<&str> {
        match channel {
            AlertChannel::NewOrder => self.config.new_order_webhook.as_deref(),
            AlertChannel::DataChange => self.config.data_change_webhook.as_deref(),
            AlertChannel::Error => self.config.error_webhook.as_deref(),
        }
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(NotifyError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: AlertChannel, text: &str) -> Result<()> {
        let Some(url) = self.webhook(channel) else {
            tracing::warn!(channel = channel.name(), "No webhook configured, alert dropped");
            return Ok(());
        };
        self.post(url, &WebhookMessage { text }).await?;
        tracing::debug!(channel = channel.name(), "Alert delivered");
        Ok(())
    }

    async fn send_direct(&self, text: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) =
            (&self.config.telegram_bot_token, self.config.telegram_chat_id)
        else {
            tracing::debug!("Direct messages not configured");
            return Ok(());
        };
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.telegram_api_base.trim_end_matches('/'),
            token
        );
        if let Err(e) = self.post(&url, &DirectMessage { chat_id, text }).await {
            tracing::warn!(error = %e, "Direct message failed");
        }
        Ok(())
    }
}
