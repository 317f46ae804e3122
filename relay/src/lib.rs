//! mailrelay - a sendmail/SMTP stub that forwards local mail to chat and
//! file destinations.
//!
//! Local programs (cron first of all) hand mail to `sendmail` or to an SMTP
//! server on localhost. mailrelay accepts that mail, normalizes it into a
//! [`Message`], and fans it out to Telegram, Slack and/or a directory of
//! JSON files.
//!
//! ## Architecture
//!
//! ```text
//! stdin (batch) ─┐
//!                ├→ Message → queue(1) → Dispatcher → Telegram, Slack, File
//! SMTP sessions ─┘
//! ```

pub mod app;
pub mod config;
pub mod destination;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod message;
pub mod parse;
pub mod smtp;
pub mod split;
pub mod util;

// Re-export commonly used types
pub use app::{run, RunMode};
pub use config::Config;
pub use destination::Destination;
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{ConfigError, DeliveryError, IngestError};
pub use message::{Message, MessageReceiver, MessageSender};
