//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `rfid` - Serial RFID reader and tag frame decoder
//! - `acl_client` - HTTP client for the access-control server
//! - `relay_gpio` - Door strike relay through a sysfs GPIO value file
//! - `panel` - Display panel abstraction
//! - `mqtt_status` - MQTT connection and status publisher
//! - `radio` - WiFi radio driver interface and simulated radio
//! - `admin_http` - Admin status and actions HTTP endpoint

pub mod acl_client;
pub mod admin_http;
pub mod mqtt_status;
pub mod panel;
pub mod radio;
pub mod relay_gpio;
pub mod rfid;

// Re-export commonly used types
pub use acl_client::{AccessCheck, AclClient, AclError};
pub use admin_http::{start_admin_server, AdminState};
pub use mqtt_status::{
    create_mqtt_publisher, MqttSettings, MqttState, MqttStatusPublisher, NullPublisher,
    StatusPublisher,
};
pub use panel::{DisplayPanel, LogPanel, Screen, Tone};
pub use radio::{DriverEvent, SimRadio, WifiRadio};
pub use relay_gpio::{relay_from_config, RelayOutput};
pub use rfid::RfidReader;
