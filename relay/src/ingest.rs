//! Batch ingestion: one message piped on stdin, as cron does with sendmail.
//!
//! The read is raced against a short timeout. When nothing arrives (stdin
//! is a terminal, or an idle pipe under a service manager) the caller moves
//! on to the SMTP listener instead.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::message::{Message, MessageSender};
use crate::parse::parse_batch;

/// Result of the stdin attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A message was read and handed to the dispatcher
    Queued,
    /// Input ended without anything to send
    NothingToSend,
    /// No complete input before the timeout
    TimedOut,
}

/// Read `reader` to the end and parse it into a message.
pub async fn read_batch<R>(mut reader: R) -> Result<Option<Message>, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).await?;
    let acquired = Utc::now();

    info!(input_length = raw.len(), "batch_input_read");

    parse_batch(&String::from_utf8_lossy(&raw), acquired)
}

/// Try to ingest one message from `reader` within `timeout`.
///
/// On success the message is moved into the dispatch queue. A read that
/// loses the race is dropped, not left running.
pub async fn run_batch<R>(reader: R, queue: &MessageSender, timeout: Duration) -> BatchOutcome
where
    R: AsyncRead + Unpin,
{
    info!(timeout_ms = timeout.as_millis() as u64, "batch_ingest_start");

    let message = match tokio::time::timeout(timeout, read_batch(reader)).await {
        Ok(Ok(Some(message))) => message,
        Ok(Ok(None)) => {
            info!("batch_nothing_to_send");
            return BatchOutcome::NothingToSend;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "batch_ingest_failed");
            return BatchOutcome::NothingToSend;
        }
        Err(_) => {
            info!(timeout_ms = timeout.as_millis() as u64, "batch_ingest_timed_out");
            return BatchOutcome::TimedOut;
        }
    };

    if let Err(e) = queue.send(message).await {
        error!(error = %e, "batch_enqueue_failed");
        return BatchOutcome::NothingToSend;
    }

    info!("batch_message_queued");
    BatchOutcome::Queued
}
