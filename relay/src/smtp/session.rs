//! Per-connection SMTP-ish state machine.
//!
//! ```text
//! Greeting → Command ──DATA──→ Data ──"." / EOF──→ Closing → end
//!               │                │
//!               └── QUIT / EOF ──┴── QUIT ─────────────────→ end
//! ```
//!
//! The only client is a cooperating local process delivering one message,
//! so every recognized command gets an "OK" and anything else is ignored.
//! A line or DATA section over the session [`Limits`] ends the session with
//! `552` and drops whatever was collected.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::message::{Message, MessageSender};
use crate::parse::{is_mime_document, parse_mime, HeaderBlock};

/// Banner sent after the hostname in the greeting line.
pub const BANNER: &str = "mailrelay ESMTP ready";

/// How long to wait for QUIT once the body has been accepted.
const QUIT_WAIT: Duration = Duration::from_secs(30);

/// Size limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Longest accepted line in bytes, terminator included
    pub max_line_length: usize,
    /// Largest accepted DATA section in bytes
    pub max_data_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_line_length: 64 * 1024,
            max_data_size: 10 * 1024 * 1024,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A message was handed to the dispatcher
    Queued,
    /// The session ended with nothing to send
    NothingToSend,
    /// QUIT arrived during DATA; the partial body was dropped
    Aborted,
    /// A line or the DATA section exceeded the session limits
    TooLarge,
}

/// A line received in the command phase.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// HELO or EHLO
    Hello,
    /// MAIL FROM, with the value after the first colon if there was one
    MailFrom(Option<String>),
    /// RCPT TO, with the value after the first colon if there was one
    RcptTo(Option<String>),
    Data,
    Quit,
    /// Anything else; ignored
    Other,
}

impl Command {
    /// Classify a raw line, case-insensitively and ignoring surrounding
    /// whitespace.
    pub fn parse(line: &str) -> Self {
        let normalized = line.trim().to_ascii_lowercase();

        if normalized.starts_with("helo") || normalized.starts_with("ehlo") {
            Command::Hello
        } else if normalized.starts_with("mail from") {
            Command::MailFrom(value_after_colon(line))
        } else if normalized.starts_with("rcpt to") {
            Command::RcptTo(value_after_colon(line))
        } else if normalized == "data" {
            Command::Data
        } else if normalized == "quit" {
            Command::Quit
        } else {
            Command::Other
        }
    }
}

fn value_after_colon(line: &str) -> Option<String> {
    line.split_once(':').map(|(_, value)| value.trim().to_string())
}

fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("quit")
}

fn is_end_of_data(line: &str) -> bool {
    line.trim() == "."
}

enum State {
    Command,
    Data,
    /// Body complete; wait for the client's QUIT before hanging up
    Closing,
    /// A limit was exceeded; reply 552 and hang up
    Oversized,
    Done,
}

/// One client connection.
pub struct Session<S> {
    stream: BufReader<S>,
    hostname: String,
    queue: MessageSender,
    limits: Limits,
    from: String,
    to: String,
    body: Vec<String>,
    data_size: usize,
    oversized: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, hostname: impl Into<String>, queue: MessageSender) -> Self {
        Self {
            stream: BufReader::new(stream),
            hostname: hostname.into(),
            queue,
            limits: Limits::default(),
            from: String::new(),
            to: String::new(),
            body: Vec::new(),
            data_size: 0,
            oversized: false,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Drive the session to completion.
    ///
    /// Errors are write failures on the connection; they end this session
    /// only.
    pub async fn run(mut self) -> std::io::Result<SessionOutcome> {
        let greeting = format!("220 {} {}", self.hostname, BANNER);
        self.reply(&greeting).await?;

        let mut outcome = SessionOutcome::NothingToSend;
        let mut state = State::Command;

        loop {
            state = match state {
                State::Command => self.command_phase().await?,
                State::Data => match self.data_phase().await? {
                    Some(next) => next,
                    None => {
                        outcome = SessionOutcome::Aborted;
                        State::Done
                    }
                },
                State::Closing => {
                    outcome = self.finish().await;
                    if let Ok(Some(line)) = timeout(QUIT_WAIT, self.next_line()).await {
                        if is_quit(&line) {
                            self.reply("221 OK quit").await?;
                        }
                    }
                    State::Done
                }
                State::Oversized => {
                    self.body.clear();
                    outcome = SessionOutcome::TooLarge;
                    self.reply("552 Size limit exceeded").await?;
                    State::Done
                }
                State::Done => break,
            };
        }

        self.stream.get_mut().shutdown().await.ok();
        Ok(outcome)
    }

    async fn command_phase(&mut self) -> std::io::Result<State> {
        while let Some(line) = self.next_line().await {
            match Command::parse(&line) {
                Command::Hello => self.reply("250 OK welcome").await?,
                Command::MailFrom(value) => {
                    match value {
                        Some(from) => self.from = from,
                        None => debug!(line = %line.trim_end(), "smtp_mail_from_without_value"),
                    }
                    self.reply("250 OK (mail from)").await?;
                }
                Command::RcptTo(value) => {
                    match value {
                        Some(to) => self.to = to,
                        None => debug!(line = %line.trim_end(), "smtp_rcpt_to_without_value"),
                    }
                    self.reply("250 OK (rcpt to)").await?;
                }
                Command::Data => {
                    self.reply("354 OK (data)").await?;
                    return Ok(State::Data);
                }
                Command::Quit => {
                    self.reply("221 OK quit").await?;
                    return Ok(State::Done);
                }
                Command::Other => debug!(line = %line.trim_end(), "smtp_line_ignored"),
            }
        }

        if self.oversized {
            return Ok(State::Oversized);
        }
        Ok(State::Done)
    }

    /// Collect body lines. `None` means the client quit mid-body.
    async fn data_phase(&mut self) -> std::io::Result<Option<State>> {
        while let Some(line) = self.next_line().await {
            if is_end_of_data(&line) {
                self.reply("250 OK body").await?;
                return Ok(Some(State::Closing));
            }

            if is_quit(&line) {
                self.reply("221 OK quit").await?;
                info!(discarded_lines = self.body.len(), "smtp_data_aborted");
                self.body.clear();
                return Ok(None);
            }

            self.data_size += line.len();
            if self.data_size > self.limits.max_data_size {
                warn!(
                    data_size = self.data_size,
                    max_data_size = self.limits.max_data_size,
                    "smtp_data_too_large"
                );
                return Ok(Some(State::Oversized));
            }

            self.body.push(line);
        }

        if self.oversized {
            return Ok(Some(State::Oversized));
        }

        // Peer closed mid-body; whatever arrived is still delivered.
        Ok(Some(State::Closing))
    }

    async fn finish(&mut self) -> SessionOutcome {
        let raw = std::mem::take(&mut self.body);
        let message = match assemble(
            std::mem::take(&mut self.from),
            std::mem::take(&mut self.to),
            &raw,
        ) {
            Some(message) => message,
            None => {
                info!("smtp_nothing_to_send");
                return SessionOutcome::NothingToSend;
            }
        };

        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body_length = message.body.len(),
            "smtp_message_received"
        );

        if let Err(e) = self.queue.send(message).await {
            error!(error = %e, "smtp_enqueue_failed");
            return SessionOutcome::NothingToSend;
        }

        SessionOutcome::Queued
    }

    /// Read one line including its terminator, or `None` at end of stream.
    ///
    /// Read errors are logged and treated as end of stream. A line longer
    /// than `max_line_length` is not buffered past the limit; it sets
    /// `oversized` and also reads as end of stream.
    async fn next_line(&mut self) -> Option<String> {
        let max = self.limits.max_line_length;
        let mut buf = Vec::new();
        let read = (&mut self.stream)
            .take(max as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await;

        match read {
            Ok(0) => None,
            Ok(_) if buf.len() > max => {
                warn!(max_line_length = max, "smtp_line_too_long");
                self.oversized = true;
                None
            }
            Ok(_) => Some(String::from_utf8_lossy(&buf).into_owned()),
            Err(e) => {
                warn!(error = %e, "smtp_read_failed");
                None
            }
        }
    }

    async fn reply(&mut self, line: &str) -> std::io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    }
}

/// Build a message from the envelope and the raw DATA lines.
///
/// `Subject:` is taken from the header block at the top of the data; the
/// text after the blank line is the body. When the headers announce a
/// multipart or transfer-encoded document the body is MIME-decoded instead,
/// falling back to the raw text if decoding fails. The envelope `from` and
/// `to` always win over the document's own headers.
///
/// Returns `None` when there is no body.
pub fn assemble(from: String, to: String, raw: &[String]) -> Option<Message> {
    let joined = raw.concat();
    let data = joined.trim_end_matches(|c: char| c == '\r' || c == '\n');

    if data.is_empty() {
        return None;
    }

    let block = HeaderBlock::parse(data);
    let (subject, body) = if is_mime_document(&block) {
        match parse_mime(data) {
            Ok(mail) => (mail.subject.unwrap_or_default(), mail.text),
            Err(e) => {
                warn!(error = %e, "smtp_mime_parse_failed");
                plain_parts(&block)
            }
        }
    } else {
        plain_parts(&block)
    };

    if body.is_empty() {
        return None;
    }

    Some(Message {
        from,
        to,
        subject,
        body,
        ..Message::received_at(Utc::now())
    })
}

fn plain_parts(block: &HeaderBlock) -> (String, String) {
    (
        block.get("subject").unwrap_or_default().to_string(),
        block.body_text(),
    )
}
