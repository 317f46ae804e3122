//! Notification destinations.
//!
//! A destination takes a finished [`Message`] and delivers it somewhere.
//! The dispatcher only knows the [`Destination`] trait; the set and order
//! of destinations is decided once at startup by [`from_config`].

pub mod file;
pub mod slack;
pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;

use crate::config::Config;
use crate::error::DeliveryError;
use crate::message::Message;

pub use file::FileDestination;
pub use slack::SlackDestination;
pub use telegram::TelegramDestination;

/// Something a message can be delivered to.
///
/// A disabled destination must return `Ok(())` from `send` without doing
/// anything.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;

    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Timeout for one chat API request when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build every destination from configuration, in dispatch order.
///
/// Chat destinations share `client` and bound each request by
/// `config.request_timeout()`.
pub fn from_config(config: &Config, client: Client) -> Vec<Box<dyn Destination>> {
    let channels = &config.channels;
    let timeout = config.request_timeout();

    vec![
        Box::new(
            TelegramDestination::new(channels.telegram.clone(), client.clone())
                .with_timeout(timeout),
        ),
        Box::new(SlackDestination::new(channels.slack.clone(), client).with_timeout(timeout)),
        Box::new(FileDestination::new(channels.file.clone())),
    ]
}

/// Plain text rendering shared by the chat destinations.
pub fn render(message: &Message) -> String {
    format!(
        "Time: {}\nFrom: {}\nTo: {}\nSubject: {}\n\n{}",
        message.time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %z"),
        message.from,
        message.to,
        message.subject,
        message.body
    )
}

/// Prefix chunk `index` (zero-based) of `total` with `(i/n)`.
pub fn number_chunk(index: usize, total: usize, chunk: &str) -> String {
    format!("({}/{})\n{}", index + 1, total, chunk)
}
