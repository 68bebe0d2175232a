//! Access decision sinks
//!
//! Every consumer of the dispatcher's fan-out implements `AccessSink`. The
//! production sinks (relay, display, telemetry) each run their own task; the
//! dispatcher only ever talks to a `SinkHandle` that enqueues the decision.

use crate::domain::types::{AccessResult, TagId};
use crate::infra::mailbox::Mailbox;
use async_trait::async_trait;

/// Queue message shared by all sink tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMsg {
    Decision(AccessResult),
    /// Periodic timer tick, stale unless `epoch` is current
    Tick { epoch: u32 },
}

/// Consumer of access decisions
#[async_trait]
pub trait AccessSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn on_rfid_ok(&self, id: TagId);
    async fn on_rfid_bad(&self, id: TagId);
    async fn on_rfid_err(&self, id: TagId);
    async fn on_rfid_none(&self);
}

/// Route one decision to the matching sink callback
pub async fn deliver(sink: &dyn AccessSink, result: AccessResult) {
    match result {
        AccessResult::Granted(id) => sink.on_rfid_ok(id).await,
        AccessResult::Denied(id) => sink.on_rfid_bad(id).await,
        AccessResult::Error(id) => sink.on_rfid_err(id).await,
        AccessResult::Absent => sink.on_rfid_none().await,
    }
}

/// Producer side of a sink task's queue
#[derive(Debug, Clone)]
pub struct SinkHandle {
    mailbox: Mailbox<SinkMsg>,
}

impl SinkHandle {
    pub fn new(mailbox: Mailbox<SinkMsg>) -> Self {
        Self { mailbox }
    }
}

#[async_trait]
impl AccessSink for SinkHandle {
    fn name(&self) -> &'static str {
        self.mailbox.name()
    }

    async fn on_rfid_ok(&self, id: TagId) {
        self.mailbox.post(SinkMsg::Decision(AccessResult::Granted(id))).await;
    }

    async fn on_rfid_bad(&self, id: TagId) {
        self.mailbox.post(SinkMsg::Decision(AccessResult::Denied(id))).await;
    }

    async fn on_rfid_err(&self, id: TagId) {
        self.mailbox.post(SinkMsg::Decision(AccessResult::Error(id))).await;
    }

    async fn on_rfid_none(&self) {
        self.mailbox.post(SinkMsg::Decision(AccessResult::Absent)).await;
    }
}
