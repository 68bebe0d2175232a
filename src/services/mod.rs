//! Services - business logic and state management
//!
//! This module contains the core services, each running as its own task:
//! - `presence` - Presence edges and the tag debouncer
//! - `momentary` - Optional auto-revert of a present tag
//! - `dispatcher` - Access check and fan-out to the sinks
//! - `sink` - Sink callback interface and queue-backed sink handle
//! - `relay` - Drives the door strike from access decisions
//! - `display` - Status pages and the last decision
//! - `telemetry` - Publishes access decisions over MQTT
//! - `net_manager` - AP/STA arbitration for the single WiFi radio

pub mod dispatcher;
pub mod display;
pub mod momentary;
pub mod net_manager;
pub mod presence;
pub mod relay;
pub mod sink;
pub mod telemetry;

// Re-export commonly used types
pub use dispatcher::{create_dispatcher, DispatcherHandle, SinkList};
pub use display::{create_display_sink, DisplaySettings};
pub use momentary::{create_momentary_gate, MomentaryHandle};
pub use net_manager::{create_net_manager, resolve_hostname, NetHandle};
pub use presence::PresenceListener;
pub use relay::create_relay_sink;
pub use sink::{AccessSink, SinkHandle};
pub use telemetry::create_telemetry_sink;
