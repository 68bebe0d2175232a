//! Network connectivity manager
//!
//! Multiplexes the single WiFi radio between the configuration access point
//! and the upstream station link:
//! - the AP stays up unless the station link is fully up (associated and
//!   addressed) and no AP clients are attached
//! - AP transitions are deferred (on after 120 s, off after 60 s) so a brief
//!   station outage does not make the AP flap
//! - while the AP is up, station reconnects are rate limited so scanning does
//!   not starve AP clients of airtime
//!
//! All state lives in this task. Driver callbacks and timer fires both arrive
//! as `NetMsg`s on its queue; every handled message republishes a `NetStatus`
//! snapshot.

mod handlers;

use crate::domain::types::{Credential, NetStatus, PendingAction};
use crate::infra::config::{Config, CREDENTIAL_SLOTS};
use crate::infra::mailbox::{mailbox, Mailbox, QUEUE_DEPTH};
use crate::infra::timer::{Epoch, OneShotTimer};
use crate::io::radio::{DriverEvent, WifiRadio};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::info;

/// Manager-owned radio state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioState {
    pub ap_on: bool,
    pub sta_connected: bool,
    pub sta_has_ip: bool,
    pub ap_client_count: u32,
    pub pending_action: PendingAction,
    pub sta_reconnect_pending: bool,
    /// Slot used for the most recent connect attempt
    pub sta_network_index: usize,
    pub restart_pending: bool,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            ap_on: true,
            sta_connected: false,
            sta_has_ip: false,
            ap_client_count: 0,
            pending_action: PendingAction::None,
            sta_reconnect_pending: false,
            sta_network_index: 0,
            restart_pending: false,
        }
    }
}

impl RadioState {
    /// The AP is wanted unless the station link is up and nobody uses the AP
    #[inline]
    pub fn desired_ap_on(&self) -> bool {
        !(self.sta_connected && self.sta_has_ip) || self.ap_client_count != 0
    }
}

/// The manager's three deferred actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetTimer {
    ApOn,
    ApOff,
    StaReconnect,
}

impl NetTimer {
    fn as_str(self) -> &'static str {
        match self {
            NetTimer::ApOn => "ap_on",
            NetTimer::ApOff => "ap_off",
            NetTimer::StaReconnect => "sta_reconnect",
        }
    }
}

/// Messages handled by the network manager task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetMsg {
    Driver(DriverEvent),
    /// Stale unless `generation` matches the timer's current generation
    TimerFired { timer: NetTimer, generation: u32 },
    RestartPending,
}

/// A one-shot timer plus the generation its pending fire must carry
pub(crate) struct GenTimer {
    kind: NetTimer,
    timer: OneShotTimer<NetMsg>,
    generation: Epoch,
}

impl GenTimer {
    fn new(kind: NetTimer, delay: Duration, mailbox: Mailbox<NetMsg>) -> Self {
        Self { kind, timer: OneShotTimer::new(kind.as_str(), delay, mailbox), generation: Epoch::default() }
    }

    fn start(&mut self) {
        let generation = self.generation.bump();
        self.timer.start(NetMsg::TimerFired { timer: self.kind, generation });
    }

    fn stop(&mut self) {
        self.generation.bump();
        self.timer.stop();
    }

    fn is_current(&self, generation: u32) -> bool {
        self.generation.matches(generation)
    }
}

/// Client-side handle to the network manager
#[derive(Debug, Clone)]
pub struct NetHandle {
    mailbox: Mailbox<NetMsg>,
    status: watch::Receiver<NetStatus>,
}

impl NetHandle {
    /// Entry point for driver callbacks
    pub async fn post_driver_event(&self, event: DriverEvent) {
        self.mailbox.post(NetMsg::Driver(event)).await;
    }

    /// Stop further station connect attempts ahead of a restart
    pub async fn notify_upcoming_restart(&self) {
        self.mailbox.post(NetMsg::RestartPending).await;
    }

    /// Latest status snapshot
    pub fn status(&self) -> NetStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetStatus> {
        self.status.clone()
    }
}

pub struct NetManager {
    pub(crate) state: RadioState,
    radio: Box<dyn WifiRadio>,
    credentials: [Credential; CREDENTIAL_SLOTS],
    any_credentials: bool,
    hostname: String,
    admin_password: String,
    ap_ip: Ipv4Addr,
    ap_max_clients: u8,
    /// Network name and address of the current station link
    sta_network: Option<String>,
    sta_ip: Option<Ipv4Addr>,
    boot_at: Instant,
    early_boot_grace: Duration,
    early_boot: bool,
    pub(crate) ap_on_timer: GenTimer,
    pub(crate) ap_off_timer: GenTimer,
    pub(crate) sta_reconnect_timer: GenTimer,
    status_tx: watch::Sender<NetStatus>,
    pub(crate) rx: mpsc::Receiver<NetMsg>,
}

impl NetManager {
    /// Bring the radio up, then handle messages until the queue closes
    pub async fn run(mut self) {
        self.start_radio();

        while let Some(msg) = self.rx.recv().await {
            self.handle(msg);
        }

        info!("net_manager_stopped");
    }

    /// Handle one message and publish the resulting status
    pub fn handle(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Driver(event) => self.handle_driver_event(event),
            NetMsg::TimerFired { timer, generation } => self.handle_timer(timer, generation),
            NetMsg::RestartPending => {
                info!("net_restart_pending");
                self.state.restart_pending = true;
            }
        }
        self.publish_status();
    }

    pub fn state(&self) -> &RadioState {
        &self.state
    }

    fn snapshot(&self) -> NetStatus {
        let mut status = NetStatus::initial(&self.hostname, self.ap_ip);
        status.ap.enabled = self.state.ap_on;
        if !self.state.ap_on {
            status.ap.ip = None;
        }
        status.sta.connected = self.state.sta_connected;
        status.sta.has_ip = self.state.sta_has_ip;
        status.sta.network = if self.state.sta_connected { self.sta_network.clone() } else { None };
        status.sta.ip = if self.state.sta_has_ip { self.sta_ip } else { None };
        status.ap_clients = self.state.ap_client_count;
        status.pending_action = self.state.pending_action;
        status
    }

    fn publish_status(&self) {
        let status = self.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Replace characters that are not legal in a hostname with `-`
///
/// An empty hostname is derived from the last two bytes of the MAC address.
pub fn resolve_hostname(configured: &str, mac: [u8; 6]) -> String {
    if configured.is_empty() {
        return format!("BADGE-{:02x}{:02x}", mac[4], mac[5]);
    }
    configured
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
        .collect()
}

/// Create the network manager queue and task
///
/// The radio is handed over to the manager and has the manager's handle
/// registered for its callbacks. Returns the handle (for everyone else) and
/// the manager (to be spawned).
pub fn create_net_manager(
    config: &Config,
    hostname: String,
    mut radio: Box<dyn WifiRadio>,
) -> (NetHandle, NetManager) {
    let (mb, rx) = mailbox("net_manager", QUEUE_DEPTH);
    let (status_tx, status_rx) = watch::channel(NetStatus::initial(&hostname, config.ap_ip()));
    let handle = NetHandle { mailbox: mb.clone(), status: status_rx };
    radio.register_events(handle.clone());

    let manager = NetManager {
        state: RadioState::default(),
        radio,
        credentials: config.credentials().clone(),
        any_credentials: config.any_credentials(),
        hostname,
        admin_password: config.admin_password().to_string(),
        ap_ip: config.ap_ip(),
        ap_max_clients: config.ap_max_clients(),
        sta_network: None,
        sta_ip: None,
        boot_at: Instant::now(),
        early_boot_grace: config.early_boot_grace(),
        early_boot: true,
        ap_on_timer: GenTimer::new(NetTimer::ApOn, config.ap_on_delay(), mb.clone()),
        ap_off_timer: GenTimer::new(NetTimer::ApOff, config.ap_off_delay(), mb.clone()),
        sta_reconnect_timer: GenTimer::new(
            NetTimer::StaReconnect,
            config.sta_reconnect_delay(),
            mb,
        ),
        status_tx,
        rx,
    };
    (handle, manager)
}
