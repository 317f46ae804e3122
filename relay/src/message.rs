//! The normalized message shared by every stage, and the dispatch queue.
//!
//! ```text
//! stdin / SMTP session → Message → queue (capacity 1) → Dispatcher → destinations
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Number of messages that may wait for the dispatcher.
///
/// A second producer blocks on `send` until the dispatcher has taken the
/// pending message.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1;

/// Producer side of the dispatch queue.
pub type MessageSender = mpsc::Sender<Message>;

/// Consumer side of the dispatch queue, owned by the dispatcher.
pub type MessageReceiver = mpsc::Receiver<Message>;

/// Create the bounded dispatch queue.
pub fn queue() -> (MessageSender, MessageReceiver) {
    mpsc::channel(DISPATCH_QUEUE_CAPACITY)
}

/// A locally submitted mail, normalized from either input path.
///
/// Producers build it incrementally and move it into the queue with
/// `MessageSender::send`; from then on it is only read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Date of the mail, or the time it was received
    pub time: DateTime<Utc>,
    /// Lower-cased header names (batch input only)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Sender as given by the client
    #[serde(default)]
    pub from: String,
    /// Recipient as given by the client
    #[serde(default)]
    pub to: String,
    /// Subject line
    #[serde(default)]
    pub subject: String,
    /// Plain text body, lines joined with `\n`
    #[serde(default)]
    pub body: String,
}

impl Message {
    /// Create an empty message stamped with the given acquisition time.
    pub fn received_at(time: DateTime<Utc>) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }
}
