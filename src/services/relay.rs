//! Relay sink - drives the door strike from access decisions

use crate::domain::types::AccessResult;
use crate::infra::mailbox::{fatal, mailbox, QUEUE_DEPTH};
use crate::io::relay_gpio::RelayOutput;
use crate::services::sink::{SinkHandle, SinkMsg};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

pub struct RelaySink {
    output: Box<dyn RelayOutput>,
    rx: mpsc::Receiver<SinkMsg>,
}

impl RelaySink {
    /// Drive the relay until the queue closes or shutdown is signalled.
    /// The relay is released on the way out.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // Never start with the door open
        self.drive(false).await;
        info!("relay_sink_started");

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(SinkMsg::Decision(result)) => self.on_decision(result).await,
                    Some(SinkMsg::Tick { .. }) => {}
                    None => break,
                },
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            }
        }

        self.drive(false).await;
        info!("relay_sink_stopped");
    }

    async fn on_decision(&mut self, result: AccessResult) {
        match result {
            AccessResult::Granted(_) => self.drive(true).await,
            AccessResult::Absent => self.drive(false).await,
            // A denial or failed check leaves the relay as it is
            AccessResult::Denied(id) | AccessResult::Error(id) => {
                debug!(id = %id, result = %result.as_str(), "relay_unchanged");
            }
        }
    }

    async fn drive(&self, energised: bool) {
        if let Err(e) = self.output.set(energised).await {
            fatal("relay", e);
        }
        info!(energised = %energised, "relay_set");
    }
}

/// Create the relay queue and task
pub fn create_relay_sink(output: Box<dyn RelayOutput>) -> (SinkHandle, RelaySink) {
    let (mailbox, rx) = mailbox("relay", QUEUE_DEPTH);
    (SinkHandle::new(mailbox), RelaySink { output, rx })
}
