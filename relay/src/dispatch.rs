//! Dispatcher: drains the message queue and fans each message out to every
//! destination.
//!
//! There is exactly one dispatcher per process. It owns the receiving half
//! of the capacity-1 queue, so a producer's `send` completes only once the
//! previous message has been taken. Destinations run one after another for
//! each message, never concurrently.

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::destination::Destination;
use crate::message::{Message, MessageReceiver};

/// Per-message delivery summary. Disabled destinations count as delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Owns the destinations and delivers messages to them one at a time.
pub struct Dispatcher {
    destinations: Vec<Box<dyn Destination>>,
}

impl Dispatcher {
    pub fn new(destinations: Vec<Box<dyn Destination>>) -> Self {
        Self { destinations }
    }

    /// Deliver `message` to every destination in order.
    ///
    /// A failing destination is logged and skipped; it never stops the
    /// remaining ones.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to deliver, borrowed by each destination
    ///
    /// # Returns
    ///
    /// A `DispatchReport` counting successful and failed destinations.
    pub async fn dispatch(&self, message: &Message) -> DispatchReport {
        let mut report = DispatchReport::default();

        for destination in &self.destinations {
            debug!(
                destination = destination.name(),
                enabled = destination.enabled(),
                "delivery_start"
            );

            match destination.send(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!(
                        destination = destination.name(),
                        error = %e,
                        "delivery_failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            subject = %message.subject,
            delivered = report.delivered,
            failed = report.failed,
            "message_dispatched"
        );
        report
    }

    /// Process messages until every sender is gone.
    ///
    /// # Arguments
    ///
    /// * `queue` - Receiving half of the dispatch queue
    ///
    /// # Returns
    ///
    /// The number of messages handled. Awaiting this is the drain barrier
    /// for batch mode: it resolves only after the last message has been
    /// offered to every destination.
    pub async fn run(self, mut queue: MessageReceiver) -> u64 {
        info!(destinations = self.destinations.len(), "dispatcher_started");

        let mut handled = 0;
        while let Some(message) = queue.recv().await {
            self.dispatch(&message).await;
            handled += 1;
        }

        info!(handled = handled, "dispatcher_stopped");
        handled
    }

    /// Run the dispatcher on its own task.
    pub fn spawn(self, queue: MessageReceiver) -> JoinHandle<u64> {
        tokio::spawn(self.run(queue))
    }
}
