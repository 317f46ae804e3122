//! Telegram destination - posts messages through the Bot API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::destination::{number_chunk, render, Destination, DEFAULT_REQUEST_TIMEOUT};
use crate::error::DeliveryError;
use crate::message::Message;
use crate::split::split;

const NAME: &str = "telegram";

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Chunk size for the rendered text. Telegram's limit is 4096 characters;
/// the rest is headroom for numbering, the code fence and escaping.
const CHUNK_SIZE: usize = 4000;

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends each message to one Telegram chat as a MarkdownV2 code block.
pub struct TelegramDestination {
    config: TelegramConfig,
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl TelegramDestination {
    pub fn new(config: TelegramConfig, client: Client) -> Self {
        Self {
            config,
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point the destination at another Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Bound every Bot API request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.config.bot_key)
    }

    async fn send_chunk(&self, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "chat_id": self.config.user_id,
            "text": text,
            "parse_mode": "MarkdownV2",
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Http {
                destination: NAME,
                source,
            })?;

        let status = response.status();
        let reply: ApiResponse = response.json().await.map_err(|source| DeliveryError::Http {
            destination: NAME,
            source,
        })?;

        if !reply.ok {
            return Err(DeliveryError::Rejected {
                destination: NAME,
                reason: format!(
                    "status {}: {}",
                    status,
                    reply.description.unwrap_or_default()
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Destination for TelegramDestination {
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
            let text = if total > 1 {
                number_chunk(index, total, chunk)
            } else {
                chunk.clone()
            };
            self.send_chunk(&code_block(&text)).await?;
        }

        info!(destination = NAME, chunks = total, "telegram_message_sent");
        Ok(())
    }
}

/// Wrap text in a MarkdownV2 pre block. Inside it only `\` and `` ` ``
/// need escaping.
fn code_block(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('`', "\\`");
    format!("```\n{escaped}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::test_support::silent_server;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn config() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            user_id: 123456789,
            bot_key: "123:ABC".to_string(),
        }
    }

    fn message(body: String) -> Message {
        Message {
            from: "root".to_string(),
            subject: "report".to_string(),
            body,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_api_url() {
        let destination = TelegramDestination::new(config(), Client::new());
        assert_eq!(
            destination.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_code_block_escaping() {
        assert_eq!(code_block("a `b` c\\d"), "```\na \\`b\\` c\\\\d\n```");
        assert_eq!(code_block("x.y-z"), "```\nx.y-z\n```");
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let destination = TelegramDestination::new(TelegramConfig::default(), Client::new())
            .with_api_base("http://127.0.0.1:1");

        assert!(!destination.enabled());
        assert!(destination.send(&message("body".to_string())).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_single_chunk() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendMessage")
            .match_header("content-type", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "chat_id": 123456789,
                    "parse_mode": "MarkdownV2",
                })),
                // Unnumbered: the code block opens directly on the rendered header.
                Matcher::Regex(r#""text":"```\\nTime: "#.to_string()),
                Matcher::Regex("disk almost full".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{}}"#)
            .expect(1)
            .create_async()
            .await;
        let destination = TelegramDestination::new(config(), Client::new()).with_api_base(server.url());

        destination.send(&message("disk almost full".to_string())).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_long_message_numbered() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for part in ["1/2", "2/2"] {
            let numbered = format!(r#""text":"```\\n\({part}\)\\n"#);
            mocks.push(
                server
                    .mock("POST", "/bot123:ABC/sendMessage")
                    .match_body(Matcher::Regex(numbered))
                    .with_body(r#"{"ok":true}"#)
                    .expect(1)
                    .create_async()
                    .await,
            );
        }
        let destination = TelegramDestination::new(config(), Client::new()).with_api_base(server.url());

        destination.send(&message("word ".repeat(1000))).await.unwrap();

        for mock in &mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;
        let destination = TelegramDestination::new(config(), Client::new()).with_api_base(server.url());

        let err = destination.send(&message("body".to_string())).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Rejected { .. }));
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let addr = silent_server().await;
        let destination = TelegramDestination::new(config(), Client::new())
            .with_api_base(format!("http://{addr}"))
            .with_timeout(Duration::from_millis(100));

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            destination.send(&message("body".to_string())),
        )
        .await
        .expect("request was not bounded by its timeout")
        .unwrap_err();

        match err {
            DeliveryError::Http { destination, source } => {
                assert_eq!(destination, "telegram");
                assert!(source.is_timeout());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
