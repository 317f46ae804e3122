//! Minimal SMTP submission stub.
//!
//! Accepts exactly what a local mail client sends for one message
//! (HELO/EHLO, MAIL FROM, RCPT TO, DATA, QUIT) and nothing more: no
//! authentication, no TLS, one recipient.

pub mod listener;
pub mod session;

pub use listener::Listener;
pub use session::{assemble, Command, Limits, Session, SessionOutcome, BANNER};
