//! Access decision dispatcher
//!
//! The single place decisions are made. Each presence edge becomes exactly
//! one `AccessResult`, which is handed to every sink in turn. The ACL round
//! trip runs inline, so edges queue up behind a slow server; that latency is
//! bounded by the client timeout.

use crate::domain::types::{AccessResult, PresenceEvent, TagId};
use crate::infra::mailbox::{mailbox, Mailbox, QUEUE_DEPTH};
use crate::io::acl_client::AccessCheck;
use crate::services::presence::PresenceListener;
use crate::services::sink::{deliver, AccessSink};
use async_trait::async_trait;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sinks fed by the dispatcher (relay, display, telemetry)
pub type SinkList = SmallVec<[Arc<dyn AccessSink>; 3]>;

/// Producer side of the dispatcher queue, handed to the momentary gate
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    mailbox: Mailbox<PresenceEvent>,
}

#[async_trait]
impl PresenceListener for DispatcherHandle {
    async fn present(&self, id: TagId) {
        self.mailbox.post(PresenceEvent::Present(id)).await;
    }

    async fn absent(&self) {
        self.mailbox.post(PresenceEvent::Absent).await;
    }
}

pub struct Dispatcher {
    acl: Arc<dyn AccessCheck>,
    /// Grant every tag without contacting the server; toggled at runtime
    bypass: Arc<AtomicBool>,
    sinks: SinkList,
    rx: mpsc::Receiver<PresenceEvent>,
}

impl Dispatcher {
    pub async fn run(mut self) {
        info!(sinks = %self.sinks.len(), "dispatcher_started");

        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
        }

        info!("dispatcher_stopped");
    }

    /// Decide on one edge and fan the result out
    pub async fn handle_event(&self, event: PresenceEvent) -> AccessResult {
        let result = match event {
            PresenceEvent::Present(id) => self.decide(id).await,
            PresenceEvent::Absent => {
                self.log_end_of_session().await;
                AccessResult::Absent
            }
        };

        info!(result = %result.as_str(), id = ?result.tag().map(|t| t.0), "access_decision");
        for sink in &self.sinks {
            deliver(sink.as_ref(), result).await;
        }
        result
    }

    async fn decide(&self, id: TagId) -> AccessResult {
        if self.bypass.load(Ordering::Relaxed) {
            debug!(id = %id, "acl_bypassed");
            return AccessResult::Granted(id);
        }
        match self.acl.check(id).await {
            Ok(true) => AccessResult::Granted(id),
            Ok(false) => AccessResult::Denied(id),
            Err(_) => AccessResult::Error(id),
        }
    }

    /// Zero-id check so the server can log the end of a session
    async fn log_end_of_session(&self) {
        if self.bypass.load(Ordering::Relaxed) {
            return;
        }
        // Best effort: the outcome is irrelevant
        let _ = self.acl.check(TagId::NONE).await;
    }
}

/// Create the dispatcher queue and task
///
/// Returns the handle (for the momentary gate) and the dispatcher (to be spawned)
pub fn create_dispatcher(
    acl: Arc<dyn AccessCheck>,
    bypass: Arc<AtomicBool>,
    sinks: SinkList,
) -> (DispatcherHandle, Dispatcher) {
    let (mailbox, rx) = mailbox("dispatcher", QUEUE_DEPTH);
    (DispatcherHandle { mailbox }, Dispatcher { acl, bypass, sinks, rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::acl_client::AclError;
    use parking_lot::Mutex;
    use smallvec::smallvec;

    /// Scripted ACL answers, recording every id asked about
    struct ScriptedAcl {
        answer: fn(TagId) -> Result<bool, AclError>,
        asked: Mutex<Vec<TagId>>,
    }

    impl ScriptedAcl {
        fn new(answer: fn(TagId) -> Result<bool, AclError>) -> Arc<Self> {
            Arc::new(Self { answer, asked: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl AccessCheck for ScriptedAcl {
        async fn check(&self, id: TagId) -> Result<bool, AclError> {
            self.asked.lock().push(id);
            (self.answer)(id)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<AccessResult>>,
    }

    #[async_trait]
    impl AccessSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn on_rfid_ok(&self, id: TagId) {
            self.seen.lock().push(AccessResult::Granted(id));
        }

        async fn on_rfid_bad(&self, id: TagId) {
            self.seen.lock().push(AccessResult::Denied(id));
        }

        async fn on_rfid_err(&self, id: TagId) {
            self.seen.lock().push(AccessResult::Error(id));
        }

        async fn on_rfid_none(&self) {
            self.seen.lock().push(AccessResult::Absent);
        }
    }

    fn build(
        acl: Arc<ScriptedAcl>,
        bypass: bool,
    ) -> (Dispatcher, Arc<RecordingSink>, Arc<RecordingSink>) {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let sinks: SinkList = smallvec![a.clone() as Arc<dyn AccessSink>, b.clone() as Arc<dyn AccessSink>];
        let (_handle, dispatcher) =
            create_dispatcher(acl, Arc::new(AtomicBool::new(bypass)), sinks);
        (dispatcher, a, b)
    }

    #[tokio::test]
    async fn test_allowed_tag_is_granted_to_every_sink() {
        let acl = ScriptedAcl::new(|_| Ok(true));
        let (dispatcher, a, b) = build(acl.clone(), false);

        let result = dispatcher.handle_event(PresenceEvent::Present(TagId(12345))).await;

        assert_eq!(result, AccessResult::Granted(TagId(12345)));
        assert_eq!(*a.seen.lock(), vec![AccessResult::Granted(TagId(12345))]);
        assert_eq!(*b.seen.lock(), vec![AccessResult::Granted(TagId(12345))]);
        assert_eq!(*acl.asked.lock(), vec![TagId(12345)]);
    }

    #[tokio::test]
    async fn test_disallowed_tag_is_denied() {
        let acl = ScriptedAcl::new(|_| Ok(false));
        let (dispatcher, a, _b) = build(acl, false);
        let result = dispatcher.handle_event(PresenceEvent::Present(TagId(4))).await;
        assert_eq!(result, AccessResult::Denied(TagId(4)));
        assert_eq!(*a.seen.lock(), vec![AccessResult::Denied(TagId(4))]);
    }

    #[tokio::test]
    async fn test_acl_failure_is_error() {
        let acl = ScriptedAcl::new(|_| Err(AclError::UnknownLength));
        let (dispatcher, a, _b) = build(acl, false);
        let result = dispatcher.handle_event(PresenceEvent::Present(TagId(99))).await;
        assert_eq!(result, AccessResult::Error(TagId(99)));
        assert_eq!(*a.seen.lock(), vec![AccessResult::Error(TagId(99))]);
    }

    #[tokio::test]
    async fn test_absent_logs_end_of_session_and_ignores_error() {
        let acl = ScriptedAcl::new(|_| Err(AclError::NotConfigured));
        let (dispatcher, a, _b) = build(acl.clone(), false);
        let result = dispatcher.handle_event(PresenceEvent::Absent).await;
        assert_eq!(result, AccessResult::Absent);
        assert_eq!(*a.seen.lock(), vec![AccessResult::Absent]);
        assert_eq!(*acl.asked.lock(), vec![TagId::NONE]);
    }

    #[tokio::test]
    async fn test_bypass_never_contacts_server() {
        let acl = ScriptedAcl::new(|_| Err(AclError::NotConfigured));
        let (dispatcher, a, b) = build(acl.clone(), true);

        let granted = dispatcher.handle_event(PresenceEvent::Present(TagId(8))).await;
        let absent = dispatcher.handle_event(PresenceEvent::Absent).await;

        assert_eq!(granted, AccessResult::Granted(TagId(8)));
        assert_eq!(absent, AccessResult::Absent);
        assert!(acl.asked.lock().is_empty());
        assert_eq!(*a.seen.lock(), vec![AccessResult::Granted(TagId(8)), AccessResult::Absent]);
        assert_eq!(*b.seen.lock(), vec![AccessResult::Granted(TagId(8)), AccessResult::Absent]);
    }

    #[tokio::test]
    async fn test_bypass_toggle_takes_effect_immediately() {
        let acl = ScriptedAcl::new(|_| Ok(false));
        let (dispatcher, _a, _b) = build(acl, false);
        assert_eq!(
            dispatcher.handle_event(PresenceEvent::Present(TagId(3))).await,
            AccessResult::Denied(TagId(3))
        );
        dispatcher.bypass.store(true, Ordering::Relaxed);
        assert_eq!(
            dispatcher.handle_event(PresenceEvent::Present(TagId(3))).await,
            AccessResult::Granted(TagId(3))
        );
    }
}
