//! Telemetry sink - publishes the last access decision over MQTT
//!
//! Every decision is published once. With a nonzero status period the last
//! document is re-published on a periodic timer for as long as access stays
//! granted.

use crate::domain::types::AccessResult;
use crate::infra::mailbox::{mailbox, QUEUE_DEPTH};
use crate::infra::timer::{Epoch, PeriodicTimer};
use crate::io::mqtt_status::StatusPublisher;
use crate::services::sink::{SinkHandle, SinkMsg};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Status document published to `stat/<topic>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub status: &'static str,
    pub rfid_status: &'static str,
    pub rfid: u32,
}

impl From<AccessResult> for StatusPayload {
    fn from(result: AccessResult) -> Self {
        let (status, rfid_status) = match result {
            AccessResult::Granted(_) => ("ON", "GRANT"),
            AccessResult::Denied(_) => ("OFF", "DENY"),
            AccessResult::Error(_) => ("OFF", "ERROR"),
            AccessResult::Absent => ("OFF", "ABSENT"),
        };
        Self { status, rfid_status, rfid: result.tag().map_or(0, |t| t.0) }
    }
}

pub struct TelemetrySink {
    publisher: Arc<dyn StatusPublisher>,
    /// Present only with a nonzero status period
    periodic: Option<PeriodicTimer<SinkMsg>>,
    epoch: Epoch,
    last: StatusPayload,
    rx: mpsc::Receiver<SinkMsg>,
}

impl TelemetrySink {
    pub async fn run(mut self) {
        info!(periodic = %self.periodic.is_some(), "telemetry_sink_started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                SinkMsg::Decision(result) => self.on_decision(result).await,
                SinkMsg::Tick { epoch } => self.on_tick(epoch).await,
            }
        }

        info!("telemetry_sink_stopped");
    }

    async fn on_decision(&mut self, result: AccessResult) {
        let granted = matches!(result, AccessResult::Granted(_));
        if !granted {
            self.stop_periodic();
        }

        self.last = StatusPayload::from(result);
        self.publish().await;

        if granted {
            self.start_periodic();
        }
    }

    async fn on_tick(&mut self, epoch: u32) {
        if !self.epoch.matches(epoch) {
            warn!(msg_epoch = %epoch, state_epoch = %self.epoch.current(), "telemetry_epoch_mismatch");
            return;
        }
        self.publish().await;
    }

    fn start_periodic(&mut self) {
        if let Some(timer) = self.periodic.as_mut() {
            let epoch = self.epoch.bump();
            timer.start(SinkMsg::Tick { epoch });
        }
    }

    fn stop_periodic(&mut self) {
        if let Some(timer) = self.periodic.as_mut() {
            self.epoch.bump();
            timer.stop();
        }
    }

    async fn publish(&self) {
        match serde_json::to_string(&self.last) {
            Ok(json) => {
                debug!(payload = %json, "telemetry_publish");
                self.publisher.publish_status(&json).await;
            }
            Err(e) => warn!(error = %e, "telemetry_serialize_failed"),
        }
    }
}

/// Create the telemetry queue and task
pub fn create_telemetry_sink(
    publisher: Arc<dyn StatusPublisher>,
    status_period_secs: u16,
) -> (SinkHandle, TelemetrySink) {
    let (mb, rx) = mailbox("telemetry", QUEUE_DEPTH);
    let periodic = (status_period_secs > 0).then(|| {
        PeriodicTimer::new(
            "telemetry_status",
            Duration::from_secs(u64::from(status_period_secs)),
            mb.clone(),
        )
    });
    let sink = TelemetrySink {
        publisher,
        periodic,
        epoch: Epoch::default(),
        last: StatusPayload::from(AccessResult::Absent),
        rx,
    };
    (SinkHandle::new(mb), sink)
}
