//! Shared types for the badge gate

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Newtype wrapper for badge (RFID tag) IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct TagId(pub u32);

impl TagId {
    /// ID used for the end-of-session marker sent to the ACL server
    pub const NONE: TagId = TagId(0);
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A presence edge, as produced by the debouncer and the momentary gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Present(TagId),
    Absent,
}

/// Outcome of one presence transition, fanned out to every sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Granted(TagId),
    Denied(TagId),
    /// The ACL round trip failed (transport, timeout or bad response)
    Error(TagId),
    Absent,
}

impl AccessResult {
    #[inline]
    pub fn tag(&self) -> Option<TagId> {
        match self {
            AccessResult::Granted(id) | AccessResult::Denied(id) | AccessResult::Error(id) => {
                Some(*id)
            }
            AccessResult::Absent => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessResult::Granted(_) => "granted",
            AccessResult::Denied(_) => "denied",
            AccessResult::Error(_) => "error",
            AccessResult::Absent => "absent",
        }
    }
}

/// One configured upstream WiFi network
///
/// An empty `ssid` marks an unused slot.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub ssid: String,
    pub password: String,
}

impl Credential {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self { ssid: ssid.into(), password: password.into() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &self.ssid)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// Radio operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioMode {
    /// Configuration access point only
    Ap,
    /// Access point plus upstream station
    ApSta,
    /// Upstream station only
    Sta,
}

/// Deferred AP transition waiting on its timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    ApOn,
    ApOff,
}

/// Access point half of the network status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApInfo {
    pub enabled: bool,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
}

/// Station half of the network status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaInfo {
    pub connected: bool,
    pub has_ip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
}

/// Read-only network status, republished after every manager event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetStatus {
    pub ap: ApInfo,
    pub sta: StaInfo,
    pub ap_clients: u32,
    pub pending_action: PendingAction,
}

impl NetStatus {
    /// Status before the manager has handled anything: AP up, STA down
    pub fn initial(hostname: &str, ap_ip: Ipv4Addr) -> Self {
        Self {
            ap: ApInfo { enabled: true, network: hostname.to_string(), ip: Some(ap_ip) },
            sta: StaInfo { connected: false, has_ip: false, network: None, ip: None },
            ap_clients: 0,
            pending_action: PendingAction::None,
        }
    }
}
