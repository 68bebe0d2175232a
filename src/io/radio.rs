//! WiFi radio driver interface
//!
//! The radio is shared between the configuration access point and the
//! upstream station link. Only the network manager task touches it. Driver
//! callbacks come back asynchronously as `DriverEvent`s posted into the
//! manager's queue through the sink registered with `register_events`.

use crate::domain::types::{Credential, RadioMode};
use crate::services::net_manager::NetHandle;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Link-layer and IP events reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    StaStarted,
    StaConnected { ssid: String },
    StaDisconnected,
    GotIp(Ipv4Addr),
    LostIp,
    ApClientJoined,
    ApClientLeft,
    ApStarted,
    ApStopped,
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio not started")]
    NotStarted,
    #[error("{op} rejected by driver: {reason}")]
    Rejected { op: &'static str, reason: String },
}

/// Access point authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApAuth {
    Open,
    Wpa2Psk,
}

/// Access point settings
#[derive(Clone, PartialEq, Eq)]
pub struct ApConfig {
    pub ssid: String,
    pub password: String,
    pub auth: ApAuth,
    pub max_clients: u8,
}

impl ApConfig {
    /// WPA2 with the admin password, or open when no password is set
    pub fn new(ssid: &str, password: &str, max_clients: u8) -> Self {
        let auth = if password.is_empty() { ApAuth::Open } else { ApAuth::Wpa2Psk };
        Self { ssid: ssid.to_string(), password: password.to_string(), auth, max_clients }
    }
}

impl std::fmt::Debug for ApConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApConfig")
            .field("ssid", &self.ssid)
            .field("auth", &self.auth)
            .field("max_clients", &self.max_clients)
            .finish()
    }
}

/// Driver operations used by the network manager
pub trait WifiRadio: Send {
    /// Where driver callbacks are delivered
    fn register_events(&mut self, events: NetHandle);
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;
    fn configure_ap(&mut self, config: &ApConfig) -> Result<(), RadioError>;
    fn configure_sta(&mut self, credential: &Credential) -> Result<(), RadioError>;
    fn start(&mut self) -> Result<(), RadioError>;
    /// Begin associating with the configured station network
    fn connect(&mut self) -> Result<(), RadioError>;
    fn base_mac(&self) -> [u8; 6];
}

/// One call made against the radio, as recorded by `SimRadio`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    SetMode(RadioMode),
    ConfigureAp { ssid: String, auth: ApAuth, max_clients: u8 },
    ConfigureSta { ssid: String },
    Start,
    Connect { ssid: String },
}

/// Shared, inspectable record of radio calls
pub type CallLog = Arc<Mutex<Vec<RadioCall>>>;

/// Simulated radio for development boards and tests
///
/// Joins only the SSIDs listed as reachable; any other connect attempt
/// fails with a disconnect after `fail_after`.
pub struct SimRadio {
    mac: [u8; 6],
    reachable: Vec<String>,
    fail_after: Duration,
    mode: Option<RadioMode>,
    started: bool,
    sta: Credential,
    next_host: u8,
    events: Option<NetHandle>,
    calls: CallLog,
}

impl SimRadio {
    pub fn new(mac: [u8; 6], reachable: Vec<String>) -> Self {
        Self {
            mac,
            reachable,
            fail_after: Duration::from_secs(3),
            mode: None,
            started: false,
            sta: Credential::default(),
            next_host: 10,
            events: None,
            calls: CallLog::default(),
        }
    }

    /// Handle for inspecting the calls made so far
    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    fn record(&self, call: RadioCall) {
        debug!(call = ?call, "sim_radio_call");
        self.calls.lock().push(call);
    }

    /// Deliver events in order after `delay`
    fn emit(&self, delay: Duration, events: Vec<DriverEvent>) {
        let Some(handle) = self.events.clone() else { return };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for event in events {
                handle.post_driver_event(event).await;
            }
        });
    }
}

fn has_ap(mode: Option<RadioMode>) -> bool {
    matches!(mode, Some(RadioMode::Ap | RadioMode::ApSta))
}

fn has_sta(mode: Option<RadioMode>) -> bool {
    matches!(mode, Some(RadioMode::Sta | RadioMode::ApSta))
}

impl WifiRadio for SimRadio {
    fn register_events(&mut self, events: NetHandle) {
        self.events = Some(events);
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.record(RadioCall::SetMode(mode));
        let previous = self.mode.replace(mode);
        if self.started {
            let mut events = Vec::new();
            match (has_ap(previous), has_ap(Some(mode))) {
                (true, false) => events.push(DriverEvent::ApStopped),
                (false, true) => events.push(DriverEvent::ApStarted),
                _ => {}
            }
            if !has_sta(previous) && has_sta(Some(mode)) {
                events.push(DriverEvent::StaStarted);
            }
            self.emit(Duration::ZERO, events);
        }
        Ok(())
    }

    fn configure_ap(&mut self, config: &ApConfig) -> Result<(), RadioError> {
        if config.ssid.is_empty() || config.ssid.len() > 32 {
            return Err(RadioError::Rejected {
                op: "configure_ap",
                reason: format!("invalid ssid length {}", config.ssid.len()),
            });
        }
        self.record(RadioCall::ConfigureAp {
            ssid: config.ssid.clone(),
            auth: config.auth,
            max_clients: config.max_clients,
        });
        Ok(())
    }

    fn configure_sta(&mut self, credential: &Credential) -> Result<(), RadioError> {
        self.record(RadioCall::ConfigureSta { ssid: credential.ssid.clone() });
        self.sta = credential.clone();
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::Start);
        self.started = true;
        let mut events = Vec::new();
        if has_ap(self.mode) {
            events.push(DriverEvent::ApStarted);
        }
        if has_sta(self.mode) {
            events.push(DriverEvent::StaStarted);
        }
        info!(mode = ?self.mode, "sim_radio_started");
        self.emit(Duration::ZERO, events);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }
        let ssid = self.sta.ssid.clone();
        self.record(RadioCall::Connect { ssid: ssid.clone() });

        if self.reachable.iter().any(|s| *s == ssid) {
            let ip = Ipv4Addr::new(10, 0, 0, self.next_host);
            self.next_host = self.next_host.wrapping_add(1).max(10);
            self.emit(
                Duration::from_millis(500),
                vec![DriverEvent::StaConnected { ssid }, DriverEvent::GotIp(ip)],
            );
        } else {
            self.emit(self.fail_after, vec![DriverEvent::StaDisconnected]);
        }
        Ok(())
    }

    fn base_mac(&self) -> [u8; 6] {
        self.mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ap_config_auth_follows_password() {
        assert_eq!(ApConfig::new("badge", "", 2).auth, ApAuth::Open);
        assert_eq!(ApConfig::new("badge", "secret", 2).auth, ApAuth::Wpa2Psk);
    }

    #[test]
    fn test_ap_config_debug_hides_password() {
        let out = format!("{:?}", ApConfig::new("badge", "secret", 2));
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_connect_before_start_fails() {
        let mut radio = SimRadio::new([0; 6], vec![]);
        assert!(matches!(radio.connect(), Err(RadioError::NotStarted)));
    }

    #[test]
    fn test_calls_are_recorded() {
        let mut radio = SimRadio::new([0; 6], vec![]);
        let log = radio.call_log();
        radio.set_mode(RadioMode::ApSta).unwrap();
        radio.configure_sta(&Credential::new("net", "pw")).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                RadioCall::SetMode(RadioMode::ApSta),
                RadioCall::ConfigureSta { ssid: "net".to_string() },
            ]
        );
    }
}
