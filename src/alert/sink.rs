use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::DeliveryError;
use crate::http::{build_client, preview};

/// Delivers rendered text to a channel id.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError>;

    /// Confirms the channel id is usable before any pass relies on it.
    async fn check_channel(&self, _channel_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

pub struct StdoutSink;

#[async_trait]
impl Notifier for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        println!("[{channel_id}] {text}");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackSink {
    client: Client,
    base_url: String,
    token: String,
}

impl SlackSink {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn read_response(response: reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                preview: preview(&body),
            });
        }
        let parsed: SlackResponse = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::Rejected(format!("unreadable response: {e}")))?;
        if parsed.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl Notifier for SlackSink {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel_id, "text": text }))
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn check_channel(&self, channel_id: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .get(format!("{}/conversations.info", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("channel", channel_id)])
            .send()
            .await?;
        Self::read_response(response).await
    }
}

/// Posts to a Discord webhook, or a generic JSON webhook otherwise.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            url: url.into(),
        })
    }

    fn is_discord(&self) -> bool {
        self.url.contains("discord.com/api/webhooks")
            || self.url.contains("discordapp.com/api/webhooks")
    }
}

#[async_trait]
impl Notifier for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = if self.is_discord() {
            serde_json::json!({ "content": text })
        } else {
            serde_json::json!({ "channel": channel_id, "text": text })
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                preview: preview(&body),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_discord_webhooks() {
        let discord = WebhookSink::new("https://discord.com/api/webhooks/1/abc", 5).unwrap();
        assert!(discord.is_discord());
        let generic = WebhookSink::new("https://hooks.example.edu/grading", 5).unwrap();
        assert!(!generic.is_discord());
    }

    #[test]
    fn slack_error_payload_parses() {
        let parsed: SlackResponse =
            serde_json::from_str(r#"{"ok": false, "error": "not_in_channel"}"#).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error.as_deref(), Some("not_in_channel"));
    }

    #[test]
    fn stdout_sink_always_delivers() {
        let result = tokio_test::block_on(StdoutSink.deliver("C0123", "hello"));
        assert!(result.is_ok());
        assert!(tokio_test::block_on(StdoutSink.check_channel("C0123")).is_ok());
    }
}
