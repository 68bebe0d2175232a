//! Momentary gate - optional auto-revert between presence and dispatch
//!
//! With a zero hold time every edge passes straight through. With a hold
//! time of N seconds, `present` still passes immediately but `absent` is
//! swallowed; instead a single-shot timer restarted by every `present`
//! delivers `absent` once N seconds have passed since the latest one.

use crate::domain::types::TagId;
use crate::infra::mailbox::{mailbox, Mailbox, QUEUE_DEPTH};
use crate::infra::timer::{Epoch, OneShotTimer};
use crate::services::presence::PresenceListener;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Messages handled by the momentary gate task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMsg {
    Present(TagId),
    Absent,
    /// Hold timer expired; stale unless `epoch` is current
    Expired { epoch: u32 },
}

/// Producer side of the gate queue, handed to the debouncer
#[derive(Debug, Clone)]
pub struct MomentaryHandle {
    mailbox: Mailbox<GateMsg>,
}

#[async_trait]
impl PresenceListener for MomentaryHandle {
    async fn present(&self, id: TagId) {
        self.mailbox.post(GateMsg::Present(id)).await;
    }

    async fn absent(&self) {
        self.mailbox.post(GateMsg::Absent).await;
    }
}

/// Momentary gate task state
pub struct MomentaryGate {
    epoch: Epoch,
    timer_active: bool,
    /// Present only when a nonzero hold time is configured
    timer: Option<OneShotTimer<GateMsg>>,
    rx: mpsc::Receiver<GateMsg>,
    downstream: Arc<dyn PresenceListener>,
}

impl MomentaryGate {
    /// Run the gate until its queue closes
    pub async fn run(mut self) {
        let hold_ms = self.timer.as_ref().map(|t| t.delay().as_millis() as u64).unwrap_or(0);
        info!(hold_ms = %hold_ms, "momentary_gate_started");

        while let Some(msg) = self.rx.recv().await {
            self.handle(msg).await;
        }

        info!("momentary_gate_stopped");
    }

    async fn handle(&mut self, msg: GateMsg) {
        match msg {
            GateMsg::Present(id) => self.on_present(id).await,
            GateMsg::Absent => self.on_absent().await,
            GateMsg::Expired { epoch } => self.on_expired(epoch).await,
        }
    }

    async fn on_present(&mut self, id: TagId) {
        self.downstream.present(id).await;

        if let Some(timer) = self.timer.as_mut() {
            timer.stop();
            let epoch = self.epoch.bump();
            timer.start(GateMsg::Expired { epoch });
            self.timer_active = true;
            debug!(id = %id, epoch = %epoch, "momentary_timer_started");
        }
    }

    async fn on_absent(&mut self) {
        if self.timer.is_none() {
            self.downstream.absent().await;
        } else {
            debug!("momentary_absent_swallowed");
        }
    }

    async fn on_expired(&mut self, epoch: u32) {
        if !self.epoch.matches(epoch) || !self.timer_active {
            warn!(msg_epoch = %epoch, state_epoch = %self.epoch.current(), "momentary_epoch_mismatch");
            return;
        }
        self.timer_active = false;
        debug!(epoch = %epoch, "momentary_timer_expired");
        self.downstream.absent().await;
    }
}

/// Create the momentary gate queue and task
///
/// Returns the handle (for the debouncer) and the gate (to be spawned)
pub fn create_momentary_gate(
    hold_secs: u16,
    downstream: Arc<dyn PresenceListener>,
) -> (MomentaryHandle, MomentaryGate) {
    let (mailbox, rx) = mailbox("momentary", QUEUE_DEPTH);
    let timer = (hold_secs > 0).then(|| {
        OneShotTimer::new("momentary", Duration::from_secs(u64::from(hold_secs)), mailbox.clone())
    });
    let gate = MomentaryGate { epoch: Epoch::default(), timer_active: false, timer, rx, downstream };
    (MomentaryHandle { mailbox }, gate)
}
