//! Normalization of mail-shaped text into a [`Message`].
//!
//! ## Batch input shapes
//!
//! ```text
//! header block + blank line + text  → parse_batch() → Message   (cron output)
//! MIME document (multipart/encoded) → parse_mime()  → Message
//! ```

pub mod header_block;
pub mod mime;

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info};

use crate::error::IngestError;
use crate::message::Message;

pub use header_block::HeaderBlock;
pub use mime::{is_mime_document, parse_mime, MimeMail};

/// Header that cron uses to dump its environment, one variable per line.
const CRON_ENV_HEADER: &str = "x-cron-env";

/// Parse fully buffered piped input into a message.
///
/// Input is read as a `key: value` header block followed by a blank line
/// and the body. Documents that declare multipart content or a transfer
/// encoding are handed to [`parse_mime`] instead.
///
/// # Arguments
///
/// * `raw` - Everything read from the pipe, lossily decoded as UTF-8
/// * `acquired` - When the input was read; used when there is no usable
///   `Date` header
///
/// # Returns
///
/// `Ok(Some(message))` with lower-cased headers (cron's `X-Cron-Env` lines
/// removed), or `Ok(None)` when there is no body to send.
///
/// # Errors
///
/// `IngestError::Parse` when a MIME document cannot be parsed.
pub fn parse_batch(raw: &str, acquired: DateTime<Utc>) -> Result<Option<Message>, IngestError> {
    let block = HeaderBlock::parse(raw);

    let message = if is_mime_document(&block) {
        info!(header_count = block.fields.len(), "batch_routing_mime");
        from_mime(parse_mime(raw)?, acquired)
    } else {
        info!(header_count = block.fields.len(), "batch_routing_header_block");
        from_header_block(block, acquired)
    };

    if message.body.is_empty() {
        info!("batch_body_empty");
        return Ok(None);
    }

    info!(
        from = %message.from,
        to = %message.to,
        subject = %message.subject,
        body_length = message.body.len(),
        "batch_parse_complete"
    );

    Ok(Some(message))
}

fn from_header_block(block: HeaderBlock, acquired: DateTime<Utc>) -> Message {
    let body = block.body_text();
    let headers = collect_headers(block.fields);

    Message {
        time: message_time(headers.get("date").map(String::as_str), acquired),
        from: headers.get("from").cloned().unwrap_or_default(),
        to: headers.get("to").cloned().unwrap_or_default(),
        subject: headers.get("subject").cloned().unwrap_or_default(),
        body,
        headers,
    }
}

fn from_mime(mail: MimeMail, acquired: DateTime<Utc>) -> Message {
    Message {
        time: message_time(mail.date.as_deref(), acquired),
        headers: collect_headers(mail.headers),
        from: mail.from.unwrap_or_default(),
        to: mail.to.unwrap_or_default(),
        subject: mail.subject.unwrap_or_default(),
        body: mail.text,
    }
}

/// Lower-case header names, keep the first occurrence, drop cron's
/// environment dump.
fn collect_headers(fields: Vec<(String, String)>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut cron_env = Vec::new();

    for (name, value) in fields {
        let name = name.to_ascii_lowercase();
        if name == CRON_ENV_HEADER {
            cron_env.push(value);
            continue;
        }
        headers.entry(name).or_insert(value);
    }

    if !cron_env.is_empty() {
        debug!(cron_env = ?cron_env, "batch_cron_env_ignored");
    }

    headers
}

/// Use the mail's own date when it is a real one, otherwise the time the
/// mail was received.
pub fn message_time(date: Option<&str>, acquired: DateTime<Utc>) -> DateTime<Utc> {
    date.and_then(|value| mailparse::dateparse(value).ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .filter(|time| time.year() >= 2)
        .unwrap_or(acquired)
}
