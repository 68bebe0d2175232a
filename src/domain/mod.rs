//! Domain models - core types shared by every component
//!
//! This module contains the canonical data types used throughout the system:
//! - `TagId` - badge identifier read from the RFID reader
//! - `PresenceEvent` - debounced present/absent edges
//! - `AccessResult` - outcome of an access decision
//! - `Credential` - one upstream WiFi network
//! - `NetStatus` - read-only network status snapshot

pub mod types;

pub use types::{
    AccessResult, ApInfo, Credential, NetStatus, PendingAction, PresenceEvent, RadioMode, StaInfo,
    TagId,
};
