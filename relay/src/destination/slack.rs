//! Slack destination - posts messages with `chat.postMessage`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SlackConfig;
use crate::destination::{number_chunk, render, Destination, DEFAULT_REQUEST_TIMEOUT};
use crate::error::DeliveryError;
use crate::message::Message;
use crate::split::split;

const NAME: &str = "slack";

const DEFAULT_API_BASE: &str = "https://slack.com";

/// Chunk size for the rendered text, before numbering and fencing.
const CHUNK_SIZE: usize = 4050;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Sends each message to a Slack member or channel as a code block.
pub struct SlackDestination {
    config: SlackConfig,
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl SlackDestination {
    pub fn new(config: SlackConfig, client: Client) -> Self {
        Self {
            config,
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point the destination at another Web API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Bound every Web API request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "channel": self.config.user_id,
            "text": text,
        });

        let response = self
            .client
            .post(format!("{}/api/chat.postMessage", self.api_base))
            .bearer_auth(&self.config.bot_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Http {
                destination: NAME,
                source,
            })?;

        // Slack answers 200 for application errors; `ok` is authoritative.
        let reply: ApiResponse = response.json().await.map_err(|source| DeliveryError::Http {
            destination: NAME,
            source,
        })?;

        if !reply.ok {
            return Err(DeliveryError::Rejected {
                destination: NAME,
                reason: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Destination for SlackDestination {
    fn name(&self) -> &str {
        NAME
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        if !self.config.enabled {
            debug!(destination = NAME, "destination_disabled");
            return Ok(());
        }

        let chunks = split(CHUNK_SIZE, &render(message));
        let total = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            let text = format!("```\n{}\n```", number_chunk(index, total, chunk));
            self.post_message(&text).await?;
        }

        info!(destination = NAME, chunks = total, "slack_message_sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::test_support::silent_server;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn config() -> SlackConfig {
        SlackConfig {
            enabled: true,
            user_id: "U01ABCDEF".to_string(),
            bot_key: "xoxb-test".to_string(),
        }
    }

    fn message(body: String) -> Message {
        Message {
            from: "root".to_string(),
            subject: "backup".to_string(),
            body,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let destination = SlackDestination::new(SlackConfig::default(), Client::new())
            .with_api_base("http://127.0.0.1:1");

        assert!(!destination.enabled());
        assert!(destination.send(&message("body".to_string())).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_always_numbered() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "channel": "U01ABCDEF" })),
                Matcher::Regex(r#""text":"```\\n\(1/1\)\\nTime: "#.to_string()),
                Matcher::Regex(r#"backup done\\n```""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"channel":"D01","ts":"1.2"}"#)
            .expect(1)
            .create_async()
            .await;
        let destination = SlackDestination::new(config(), Client::new()).with_api_base(server.url());

        destination.send(&message("backup done".to_string())).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_long_message_in_parts() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for part in ["1/3", "2/3", "3/3"] {
            let numbered = format!(r#""text":"```\\n\({part}\)\\n"#);
            mocks.push(
                server
                    .mock("POST", "/api/chat.postMessage")
                    .match_header("authorization", "Bearer xoxb-test")
                    .match_body(Matcher::Regex(numbered))
                    .with_body(r#"{"ok":true}"#)
                    .expect(1)
                    .create_async()
                    .await,
            );
        }
        let destination = SlackDestination::new(config(), Client::new()).with_api_base(server.url());

        destination.send(&message("line\n".repeat(2000))).await.unwrap();

        for mock in &mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;
        let destination = SlackDestination::new(config(), Client::new()).with_api_base(server.url());

        let err = destination.send(&message("body".to_string())).await.unwrap_err();

        match err {
            DeliveryError::Rejected { destination, reason } => {
                assert_eq!(destination, "slack");
                assert_eq!(reason, "channel_not_found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let addr = silent_server().await;
        let destination = SlackDestination::new(config(), Client::new())
            .with_api_base(format!("http://{addr}"))
            .with_timeout(Duration::from_millis(100));

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            destination.send(&message("body".to_string())),
        )
        .await
        .expect("request was not bounded by its timeout")
        .unwrap_err();

        assert!(matches!(err, DeliveryError::Http { source, .. } if source.is_timeout()));
    }
}
