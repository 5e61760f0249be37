use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::NotifyError;
use crate::notify::Channel;

/// Seconds a webhook gets to answer before delivery counts as failed
pub static DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Posts `{"text": "<subject>: <body>"}` to an incoming webhook
pub struct ChatChannel {
    client: reqwest::Client,
    webhook: String,
}

impl ChatChannel {
    pub fn new(webhook: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_timeout(webhook, Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS))
    }

    /// The whole request, connect included, must finish within `timeout`
    pub fn with_timeout(webhook: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotifyError::Chat(format!("can't build webhook client: {err}")))?;
        Ok(ChatChannel { client, webhook: webhook.into() })
    }

    fn payload(subject: &str, body: &str) -> serde_json::Value {
        json!({ "text": format!("{subject}: {body}") })
    }
}

#[async_trait]
impl Channel for ChatChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook)
            .json(&Self::payload(subject, body))
            .send()
            .await
            .map_err(|err| NotifyError::Chat(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Chat(format!("webhook returned HTTP {status}: {text}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload() {
        let payload = ChatChannel::payload("Storage Usage Alert", "92.0% used");
        assert_eq!(payload, json!({"text": "Storage Usage Alert: 92.0% used"}));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_error() {
        let channel = ChatChannel::new("http://127.0.0.1:9/hook").expect("client");
        let err = channel.send("s", "b").await.expect_err("nothing listens on port 9");
        assert!(matches!(err, NotifyError::Chat(_)));
    }

    #[tokio::test]
    async fn test_silent_webhook_times_out() {
        // accepts the connection, never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        let channel = ChatChannel::with_timeout(format!("http://{address}/hook"), Duration::from_millis(200)).expect("client");
        let outcome = tokio::time::timeout(Duration::from_secs(5), channel.send("s", "b")).await;
        match outcome {
            Ok(Err(NotifyError::Chat(_))) => {}
            other => panic!("expected a delivery error within the timeout, got {other:?}"),
        }
        server.abort();
    }
}
