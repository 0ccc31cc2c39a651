//! Completion notifications.
//!
//! A [`NotificationSink`] is told once per run that the claim writes went
//! out. Delivery problems are logged and swallowed; the transfer never
//! waits on or retries a notification.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::Alias;

// ============================================================================
// Constants
// ============================================================================

/// Follow-up message posted after the embed.
pub const AUXILIARY_CONTENT: &str = "https://media.discordapp.net/attachments/1242891781205524553/1267134157423906947/image.gif?ex=69081a65&is=6906c8e5&hm=e4538a05f63c85d7c4a8dffb4b4d95d7dba406722ab3b3968df9ea61fbca425a&=";

/// Per-request timeout for webhook posts.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// NotificationEvent
// ============================================================================

/// What the sink is told after the claim phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Alias that was claimed.
    pub alias: Alias,
    /// Always `true`: the claim response is never checked.
    pub success: bool,
}

// ============================================================================
// NotificationSink
// ============================================================================

/// Receiver of the completion notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers the event. Must not fail or retry.
    async fn notify(&self, event: NotificationEvent);
}

/// Sink used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, event: NotificationEvent) {
        info!(vanity = %event.alias, success = event.success, "No webhook configured");
    }
}

// ============================================================================
// WebhookNotifier
// ============================================================================

/// Posts the completion message to a Discord-style webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    auxiliary: Option<String>,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            auxiliary: Some(AUXILIARY_CONTENT.to_string()),
        })
    }

    /// Replaces or removes the follow-up message.
    #[must_use]
    pub fn with_auxiliary(mut self, content: Option<String>) -> Self {
        self.auxiliary = content;
        self
    }

    /// Posts the embed and then the follow-up message.
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        self.post(&embed_payload(&event.alias)).await?;
        if let Some(content) = &self.auxiliary {
            self.post(&json!({ "content": content })).await?;
        }
        Ok(())
    }

    async fn post(&self, payload: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notification(format!("webhook returned {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, event: NotificationEvent) {
        match self.deliver(&event).await {
            Ok(()) => info!(vanity = %event.alias, "Webhook notification sent"),
            Err(e) => error!(error = %e, "Failed to send webhook notification"),
        }
    }
}

/// Embed payload announcing the swapped vanity.
fn embed_payload(alias: &Alias) -> Value {
    json!({
        "embeds": [
            {
                "description": format!("Swapped vanity : **{alias}**"),
                "color": 0x000000,
            }
        ]
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event() -> NotificationEvent {
        NotificationEvent {
            alias: Alias::new("cool").unwrap(),
            success: true,
        }
    }

    #[test]
    fn test_embed_payload() {
        let payload = embed_payload(&Alias::new("cool").unwrap());
        assert_eq!(
            payload["embeds"][0]["description"],
            "Swapped vanity : **cool**"
        );
        assert_eq!(payload["embeds"][0]["color"], 0);
    }

    #[tokio::test]
    async fn test_noop_notifier() {
        NoopNotifier.notify(event()).await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/hook")).unwrap();
        let notifier = WebhookNotifier::new(url).unwrap();
        notifier.notify(event()).await;
    }

    #[tokio::test]
    async fn test_webhook_posts_embed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            // Read until the JSON body has arrived.
            while !received.ends_with(b"}]}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/hook")).unwrap();
        let notifier = WebhookNotifier::new(url).unwrap().with_auxiliary(None);
        notifier.deliver(&event()).await.expect("delivered");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1"));
        assert!(request.contains("Swapped vanity : **cool**"));
    }
}
