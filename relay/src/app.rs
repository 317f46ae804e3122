//! Startup orchestration.
//!
//! ```text
//! spawn dispatcher
//!   └─ stdin within timeout? ── yes ─→ enqueue, close queue, drain, exit
//!                             └─ no ──→ SMTP listener until shutdown
//! ```

use std::future::Future;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tracing::info;

use crate::config::Config;
use crate::destination::Destination;
use crate::dispatch::Dispatcher;
use crate::ingest::{run_batch, BatchOutcome};
use crate::message::queue;
use crate::smtp::Listener;
use crate::util::local_hostname;

/// Which input path handled the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// A message came in on `input` and was delivered
    Batch,
    /// Nothing usable on `input`; the SMTP listener ran until shutdown
    Listener,
}

/// Run the relay.
///
/// `input` is tried first as a batch message. If it yields nothing within
/// the configured timeout the SMTP listener is bound and serves until
/// `shutdown` completes.
pub async fn run<R, F>(
    config: Config,
    destinations: Vec<Box<dyn Destination>>,
    input: R,
    shutdown: F,
) -> Result<RunMode>
where
    R: AsyncRead + Unpin,
    F: Future<Output = ()>,
{
    let (tx, rx) = queue();
    let dispatcher = Dispatcher::new(destinations).spawn(rx);

    match run_batch(input, &tx, config.stdin_timeout()).await {
        BatchOutcome::Queued => {
            drop(tx);
            let handled = dispatcher.await.context("Dispatcher task failed")?;
            info!(handled = handled, "batch_complete");
            return Ok(RunMode::Batch);
        }
        outcome => info!(outcome = ?outcome, "starting_smtp_listener"),
    }

    let listener = Listener::bind(&config.listen_addr(), local_hostname()).await?;
    listener.serve(tx, shutdown).await;

    Ok(RunMode::Listener)
}
