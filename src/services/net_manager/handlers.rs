//! Event handlers for the network manager
//!
//! Driver events update the link flags and then re-run both policies: the AP
//! policy (should a deferred AP transition be scheduled or cancelled) and the
//! station policy (should we connect now, later, or not at all).

use super::{NetManager, NetTimer};
use crate::domain::types::{PendingAction, RadioMode};
use crate::infra::config::CREDENTIAL_SLOTS;
use crate::infra::mailbox::fatal;
use crate::io::radio::{ApConfig, DriverEvent, RadioError};
use tracing::{debug, info, warn};

/// Abort on any driver failure
fn check(op: &str, result: Result<(), RadioError>) {
    if let Err(e) = result {
        fatal("net_manager", format_args!("{}: {}", op, e));
    }
}

impl NetManager {
    /// Configure and start the radio in AP (or AP+STA) mode
    pub(crate) fn start_radio(&mut self) {
        let mode = self.ap_mode();
        let ap = ApConfig::new(&self.hostname, &self.admin_password, self.ap_max_clients);
        info!(
            hostname = %self.hostname,
            mode = ?mode,
            auth = ?ap.auth,
            credentials = %self.any_credentials,
            "net_radio_starting"
        );
        check("set_mode", self.radio.set_mode(mode));
        check("configure_ap", self.radio.configure_ap(&ap));
        check("start", self.radio.start());
    }

    /// Mode used whenever the AP is on
    fn ap_mode(&self) -> RadioMode {
        if self.any_credentials {
            RadioMode::ApSta
        } else {
            RadioMode::Ap
        }
    }

    pub(crate) fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::ApStarted => {
                info!("net_ap_started");
                self.state.ap_client_count = 0;
            }
            DriverEvent::ApStopped => {
                info!("net_ap_stopped");
                self.state.ap_client_count = 0;
            }
            DriverEvent::ApClientJoined => {
                self.state.ap_client_count += 1;
                info!(clients = %self.state.ap_client_count, "net_ap_client_joined");
                self.maybe_start_pending();
            }
            DriverEvent::ApClientLeft => {
                if self.state.ap_client_count > 0 {
                    self.state.ap_client_count -= 1;
                    info!(clients = %self.state.ap_client_count, "net_ap_client_left");
                    self.maybe_start_pending();
                } else {
                    warn!("net_ap_client_left_without_clients");
                }
            }
            DriverEvent::StaStarted => {
                info!("net_sta_started");
                // Next attempt starts over from the first populated slot
                self.state.sta_network_index = CREDENTIAL_SLOTS - 1;
                self.maybe_start_pending_sta();
            }
            DriverEvent::StaConnected { ssid } => {
                info!(ssid = %ssid, "net_sta_connected");
                self.state.sta_connected = true;
                self.sta_network = Some(ssid);
                self.maybe_start_pending();
            }
            DriverEvent::StaDisconnected => {
                info!("net_sta_disconnected");
                self.state.sta_connected = false;
                self.sta_network = None;
                self.maybe_start_pending();
            }
            DriverEvent::GotIp(ip) => {
                info!(ip = %ip, "net_sta_got_ip");
                self.state.sta_has_ip = true;
                self.sta_ip = Some(ip);
                self.maybe_start_pending();
            }
            DriverEvent::LostIp => {
                info!("net_sta_lost_ip");
                self.state.sta_has_ip = false;
                self.sta_ip = None;
                self.maybe_start_pending();
            }
        }
    }

    pub(crate) fn handle_timer(&mut self, timer: NetTimer, generation: u32) {
        let current = match timer {
            NetTimer::ApOn => self.ap_on_timer.is_current(generation),
            NetTimer::ApOff => self.ap_off_timer.is_current(generation),
            NetTimer::StaReconnect => self.sta_reconnect_timer.is_current(generation),
        };
        if !current {
            debug!(timer = %timer.as_str(), generation = %generation, "net_timer_stale");
            return;
        }

        match timer {
            NetTimer::ApOn => {
                info!("net_ap_on_timer_fired");
                if self.state.pending_action == PendingAction::ApOn {
                    self.state.ap_on = true;
                    let mode = self.ap_mode();
                    check("set_mode", self.radio.set_mode(mode));
                    self.maybe_start_pending();
                }
            }
            NetTimer::ApOff => {
                info!("net_ap_off_timer_fired");
                if self.state.pending_action == PendingAction::ApOff {
                    if !(self.state.sta_connected && self.state.sta_has_ip) {
                        fatal("net_manager", "ap-off fired without a station link");
                    }
                    self.state.ap_on = false;
                    check("set_mode", self.radio.set_mode(RadioMode::Sta));
                    self.maybe_start_pending();
                }
            }
            NetTimer::StaReconnect => {
                info!("net_sta_reconnect_timer_fired");
                self.state.sta_reconnect_pending = false;
                if !self.state.sta_connected && !self.state.restart_pending {
                    self.connect_next();
                }
            }
        }
    }

    fn maybe_start_pending(&mut self) {
        self.maybe_start_pending_ap();
        self.maybe_start_pending_sta();
    }

    /// Schedule, keep or cancel the deferred AP transition
    fn maybe_start_pending_ap(&mut self) {
        let desired = self.state.desired_ap_on();
        if desired == self.state.ap_on {
            if self.state.pending_action != PendingAction::None {
                debug!(pending = ?self.state.pending_action, "net_ap_transition_cancelled");
            }
            self.ap_on_timer.stop();
            self.ap_off_timer.stop();
            self.state.pending_action = PendingAction::None;
            return;
        }

        let wanted = if desired { PendingAction::ApOn } else { PendingAction::ApOff };
        if self.state.pending_action == wanted {
            return;
        }

        if desired {
            self.ap_off_timer.stop();
            self.ap_on_timer.start();
        } else {
            self.ap_on_timer.stop();
            self.ap_off_timer.start();
        }
        info!(pending = ?wanted, "net_ap_transition_scheduled");
        self.state.pending_action = wanted;
    }

    /// Connect now, defer the connect, or do nothing
    fn maybe_start_pending_sta(&mut self) {
        if self.state.restart_pending
            || !self.any_credentials
            || self.state.sta_connected
            || self.state.sta_reconnect_pending
        {
            return;
        }

        if self.early_boot && self.boot_at.elapsed() > self.early_boot_grace {
            self.early_boot = false;
        }

        // Scanning steals airtime from AP clients, so rate limit while the AP is up
        if !self.state.ap_on || self.early_boot {
            self.connect_next();
            return;
        }

        debug!("net_sta_reconnect_deferred");
        self.state.sta_reconnect_pending = true;
        self.sta_reconnect_timer.start();
    }

    /// Advance round-robin to the next populated slot and connect to it
    fn connect_next(&mut self) {
        let Some(index) = self.next_slot() else {
            return;
        };
        self.state.sta_network_index = index;
        let credential = &self.credentials[index];
        info!(slot = %index, ssid = %credential.ssid, "net_sta_connecting");
        check("configure_sta", self.radio.configure_sta(credential));
        check("connect", self.radio.connect());
    }

    fn next_slot(&self) -> Option<usize> {
        (1..=CREDENTIAL_SLOTS)
            .map(|step| (self.state.sta_network_index + step) % CREDENTIAL_SLOTS)
            .find(|&i| !self.credentials[i].is_empty())
    }
}
