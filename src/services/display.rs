//! Display sink - rotating status pages
//!
//! Pages cycle Ident, AP, STA, MQTT, RFID on a periodic timer. A new access
//! decision jumps straight to the RFID page and restarts the rotation, so
//! the result stays visible for a full interval.

use crate::domain::types::{AccessResult, NetStatus};
use crate::infra::mailbox::{mailbox, Mailbox, QUEUE_DEPTH};
use crate::infra::timer::{Epoch, PeriodicTimer};
use crate::io::mqtt_status::MqttState;
use crate::io::panel::{DisplayPanel, Screen, Tone};
use crate::services::sink::{SinkHandle, SinkMsg};
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Longest name shown on one line before it is cut with `...`
const LINE_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Ident,
    Ap,
    Sta,
    Mqtt,
    Rfid,
}

impl Page {
    pub fn next(self) -> Self {
        match self {
            Page::Ident => Page::Ap,
            Page::Ap => Page::Sta,
            Page::Sta => Page::Mqtt,
            Page::Mqtt => Page::Rfid,
            Page::Rfid => Page::Ident,
        }
    }
}

/// Static inputs for the display
pub struct DisplaySettings {
    pub hostname: String,
    pub admin_protected: bool,
    pub mqtt_client_name: String,
    pub show_rfids: bool,
    pub page_interval: Duration,
}

pub struct DisplaySink {
    settings: DisplaySettings,
    panel: Box<dyn DisplayPanel>,
    page: Page,
    last: AccessResult,
    epoch: Epoch,
    rotation: PeriodicTimer<SinkMsg>,
    show_rfids_override: Arc<AtomicBool>,
    net: watch::Receiver<NetStatus>,
    mqtt: watch::Receiver<MqttState>,
    rx: mpsc::Receiver<SinkMsg>,
}

impl DisplaySink {
    pub async fn run(mut self) {
        info!(interval_ms = %self.settings.page_interval.as_millis(), "display_sink_started");
        self.restart_rotation();

        loop {
            self.draw();
            let Some(msg) = self.rx.recv().await else { break };
            match msg {
                SinkMsg::Tick { epoch } => self.on_tick(epoch),
                SinkMsg::Decision(result) => self.on_decision(result),
            }
        }

        info!("display_sink_stopped");
    }

    fn restart_rotation(&mut self) {
        self.rotation.stop();
        let epoch = self.epoch.bump();
        self.rotation.start(SinkMsg::Tick { epoch });
    }

    fn on_tick(&mut self, epoch: u32) {
        if !self.epoch.matches(epoch) {
            warn!(msg_epoch = %epoch, state_epoch = %self.epoch.current(), "display_epoch_mismatch");
            return;
        }
        self.page = self.page.next();
    }

    fn on_decision(&mut self, result: AccessResult) {
        if self.last == AccessResult::Absent && result == AccessResult::Absent {
            return;
        }
        debug!(result = %result.as_str(), "display_decision");
        self.last = result;
        self.page = Page::Rfid;
        self.restart_rotation();
    }

    fn draw(&mut self) {
        let screen = self.compose();
        self.panel.show(&screen);
    }

    /// Build the frame for the current page
    pub fn compose(&self) -> Screen {
        let net = self.net.borrow().clone();
        let mqtt = *self.mqtt.borrow();
        let text = match self.page {
            Page::Ident => self.ident_text(),
            Page::Ap => ap_text(&net),
            Page::Sta => sta_text(&net),
            Page::Mqtt => mqtt_text(mqtt, &self.settings.mqtt_client_name),
            Page::Rfid => self.rfid_text(),
        };
        let background = match self.last {
            AccessResult::Granted(_) => Tone::Granted,
            AccessResult::Denied(_) => Tone::Denied,
            AccessResult::Error(_) => Tone::Error,
            AccessResult::Absent => Tone::Idle,
        };
        let mqtt_ok = matches!(mqtt, MqttState::Connected | MqttState::Disabled);
        Screen { text, background, status_ok: net.sta.connected && mqtt_ok }
    }

    fn ident_text(&self) -> String {
        let access = if self.settings.admin_protected { "admin protected" } else { "admin open" };
        format!("ID\n{}\n{}", fit(&self.settings.hostname), access)
    }

    fn rfid_text(&self) -> String {
        let mut text = String::from("RFID ");
        text.push_str(match self.last {
            AccessResult::Error(_) => "comms error",
            AccessResult::Granted(_) => "granted",
            AccessResult::Denied(_) => "denied",
            AccessResult::Absent => "not present",
        });
        if let Some(id) = self.last.tag() {
            if self.settings.show_rfids || self.show_rfids_override.load(Ordering::Relaxed) {
                let _ = write!(text, "\n{}", id);
            } else {
                text.push_str("\n<hidden>");
            }
        }
        text
    }
}

fn ap_text(net: &NetStatus) -> String {
    if !net.ap.enabled {
        return "AP disabled".to_string();
    }
    let mut text = format!("AP enabled\n{}", fit(&net.ap.network));
    if let Some(ip) = net.ap.ip {
        let _ = write!(text, "\n{}", ip);
    }
    text
}

fn sta_text(net: &NetStatus) -> String {
    let mut text = String::from("STA ");
    match (&net.sta.network, net.sta.connected) {
        (Some(network), true) => {
            let _ = write!(text, "connected\n{}", fit(network));
        }
        _ => text.push_str("disconnected"),
    }
    if let (true, Some(ip)) = (net.sta.has_ip, net.sta.ip) {
        let _ = write!(text, "\n{}", ip);
    }
    text
}

fn mqtt_text(state: MqttState, client_name: &str) -> String {
    let link = if state == MqttState::Connected { "connected" } else { "disconnected" };
    format!("MQTT {}\n{}", link, fit(client_name))
}

/// Cut a name to one display line
fn fit(s: &str) -> String {
    if s.chars().count() <= LINE_WIDTH {
        return s.to_string();
    }
    let mut out: String = s.chars().take(LINE_WIDTH - 3).collect();
    out.push_str("...");
    out
}

/// Create the display queue and task
pub fn create_display_sink(
    settings: DisplaySettings,
    panel: Box<dyn DisplayPanel>,
    show_rfids_override: Arc<AtomicBool>,
    net: watch::Receiver<NetStatus>,
    mqtt: watch::Receiver<MqttState>,
) -> (SinkHandle, DisplaySink) {
    let (mb, rx): (Mailbox<SinkMsg>, _) = mailbox("display", QUEUE_DEPTH);
    let rotation = PeriodicTimer::new("display_rotation", settings.page_interval, mb.clone());
    let sink = DisplaySink {
        settings,
        panel,
        page: Page::Ident,
        last: AccessResult::Absent,
        epoch: Epoch::default(),
        rotation,
        show_rfids_override,
        net,
        mqtt,
        rx,
    };
    (SinkHandle::new(mb), sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TagId;
    use std::net::Ipv4Addr;

    fn settings(show_rfids: bool) -> DisplaySettings {
        DisplaySettings {
            hostname: "badge-front-door-01".to_string(),
            admin_protected: true,
            mqtt_client_name: "badge".to_string(),
            show_rfids,
            page_interval: Duration::from_secs(2),
        }
    }

    struct Harness {
        sink: DisplaySink,
        net_tx: watch::Sender<NetStatus>,
        mqtt_tx: watch::Sender<MqttState>,
        show_override: Arc<AtomicBool>,
    }

    fn harness(show_rfids: bool) -> Harness {
        let (net_tx, net_rx) =
            watch::channel(NetStatus::initial("badge", Ipv4Addr::new(192, 168, 4, 1)));
        let (mqtt_tx, mqtt_rx) = watch::channel(MqttState::Disabled);
        let show_override = Arc::new(AtomicBool::new(false));
        let (_handle, sink) = create_display_sink(
            settings(show_rfids),
            Box::new(crate::io::panel::LogPanel::default()),
            show_override.clone(),
            net_rx,
            mqtt_rx,
        );
        Harness { sink, net_tx, mqtt_tx, show_override }
    }

    #[test]
    fn test_fit_truncates_long_names() {
        assert_eq!(fit("short"), "short");
        assert_eq!(fit("exactly-16-chars"), "exactly-16-chars");
        assert_eq!(fit("badge-front-door-01"), "badge-front-d...");
    }

    #[test]
    fn test_page_cycle() {
        let mut page = Page::Ident;
        let mut seen = Vec::new();
        for _ in 0..5 {
            page = page.next();
            seen.push(page);
        }
        assert_eq!(seen, vec![Page::Ap, Page::Sta, Page::Mqtt, Page::Rfid, Page::Ident]);
    }

    #[tokio::test]
    async fn test_rfid_hidden_unless_enabled() {
        let mut h = harness(false);
        h.sink.on_decision(AccessResult::Granted(TagId(12345)));
        assert_eq!(h.sink.page, Page::Rfid);
        assert_eq!(h.sink.compose().text, "RFID granted\n<hidden>");
        assert_eq!(h.sink.compose().background, Tone::Granted);

        h.show_override.store(true, Ordering::Relaxed);
        assert_eq!(h.sink.compose().text, "RFID granted\n12345");
    }

    #[tokio::test]
    async fn test_error_shows_comms_error() {
        let mut h = harness(true);
        h.sink.on_decision(AccessResult::Error(TagId(99)));
        let screen = h.sink.compose();
        assert_eq!(screen.text, "RFID comms error\n99");
        assert_eq!(screen.background, Tone::Error);
    }

    #[tokio::test]
    async fn test_repeated_absent_is_ignored() {
        let mut h = harness(false);
        let epoch = h.sink.epoch.current();
        h.sink.on_decision(AccessResult::Absent);
        assert_eq!(h.sink.page, Page::Ident);
        assert_eq!(h.sink.epoch.current(), epoch);
    }

    #[tokio::test]
    async fn test_stale_tick_does_not_advance() {
        let mut h = harness(false);
        h.sink.on_decision(AccessResult::Denied(TagId(1)));
        let stale = h.sink.epoch.current().wrapping_sub(1);
        h.sink.on_tick(stale);
        assert_eq!(h.sink.page, Page::Rfid);
        h.sink.on_tick(h.sink.epoch.current());
        assert_eq!(h.sink.page, Page::Ident);
    }

    #[tokio::test]
    async fn test_status_bar_needs_sta_and_mqtt() {
        let h = harness(false);
        assert!(!h.sink.compose().status_ok);

        h.net_tx.send_modify(|s| s.sta.connected = true);
        assert!(h.sink.compose().status_ok);

        h.mqtt_tx.send_replace(MqttState::Disconnected);
        assert!(!h.sink.compose().status_ok);

        h.mqtt_tx.send_replace(MqttState::Connected);
        assert!(h.sink.compose().status_ok);
    }

    #[tokio::test]
    async fn test_network_pages() {
        let mut h = harness(false);
        h.sink.page = Page::Ap;
        assert_eq!(h.sink.compose().text, "AP enabled\nbadge\n192.168.4.1");

        h.sink.page = Page::Sta;
        assert_eq!(h.sink.compose().text, "STA disconnected");
        h.net_tx.send_modify(|s| {
            s.sta.connected = true;
            s.sta.has_ip = true;
            s.sta.network = Some("workshop".to_string());
            s.sta.ip = Some(Ipv4Addr::new(10, 0, 0, 7));
        });
        assert_eq!(h.sink.compose().text, "STA connected\nworkshop\n10.0.0.7");

        h.sink.page = Page::Mqtt;
        assert_eq!(h.sink.compose().text, "MQTT disconnected\nbadge");

        h.sink.page = Page::Ident;
        assert_eq!(h.sink.compose().text, "ID\nbadge-front-d...\nadmin protected");
    }
}
