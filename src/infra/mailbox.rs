//! Bounded point-to-point queues between component tasks
//!
//! Every component owns the receiving end of exactly one queue and blocks on
//! it. Producers hold a `Mailbox`. Enqueueing waits at most
//! `ENQUEUE_TIMEOUT`; a queue that stays full means the consumer is stuck,
//! which is unrecoverable, so the process aborts.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{error, warn};

/// Queue depth used for every component queue
pub const QUEUE_DEPTH: usize = 8;

/// Longest a producer waits for queue space before giving up
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Log and abort. Used for driver failures, queue overflow and broken invariants.
#[cold]
pub fn fatal(component: &str, reason: impl fmt::Display) -> ! {
    error!(component = %component, reason = %reason, "fatal_error_aborting");
    eprintln!("fatal: {}: {}", component, reason);
    std::process::abort()
}

/// Sending half of a component queue
pub struct Mailbox<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self { name: self.name, tx: self.tx.clone() }
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox").field("name", &self.name).finish()
    }
}

impl<T: Send> Mailbox<T> {
    /// Enqueue a message, aborting the process if the queue stays full.
    ///
    /// A closed queue only happens during shutdown; the message is dropped.
    pub async fn post(&self, msg: T) {
        match self.tx.send_timeout(msg, ENQUEUE_TIMEOUT).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => fatal(self.name, "queue full"),
            Err(SendTimeoutError::Closed(_)) => {
                warn!(queue = %self.name, "queue_closed_message_dropped");
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Create a named component queue
///
/// Returns the producer handle and the receiver for the owning task.
pub fn mailbox<T>(name: &'static str, depth: usize) -> (Mailbox<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(depth);
    (Mailbox { name, tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_is_fifo() {
        let (mb, mut rx) = mailbox::<u32>("test", QUEUE_DEPTH);
        for i in 0..QUEUE_DEPTH as u32 {
            mb.post(i).await;
        }
        for i in 0..QUEUE_DEPTH as u32 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_post_to_closed_queue_is_dropped() {
        let (mb, rx) = mailbox::<u32>("test", 1);
        drop(rx);
        // Must return instead of aborting
        mb.post(1).await;
        assert_eq!(mb.name(), "test");
    }
}
