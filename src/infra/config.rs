//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! Values are read once at boot and are read-only afterwards. Runtime
//! toggles (ACL bypass, show-RFIDs override) live in their owning components.

use crate::domain::types::Credential;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Number of upstream WiFi credential slots
pub const CREDENTIAL_SLOTS: usize = 2;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceConfig {
    /// Hostname and AP SSID; empty derives one from the MAC address
    #[serde(default)]
    pub hostname: String,
    /// Admin password, also the AP WPA2 passphrase (empty = open AP)
    #[serde(default)]
    pub admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WifiConfig {
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
    #[serde(default = "default_ap_ip")]
    pub ap_ip: Ipv4Addr,
    #[serde(default = "default_ap_max_clients")]
    pub ap_max_clients: u8,
    #[serde(default = "default_ap_on_delay_secs")]
    pub ap_on_delay_secs: u64,
    #[serde(default = "default_ap_off_delay_secs")]
    pub ap_off_delay_secs: u64,
    #[serde(default = "default_sta_reconnect_delay_secs")]
    pub sta_reconnect_delay_secs: u64,
    /// Window after boot during which STA reconnects are never deferred
    #[serde(default = "default_early_boot_grace_secs")]
    pub early_boot_grace_secs: u64,
    /// SSIDs the simulated radio will successfully join
    #[serde(default)]
    pub sim_reachable: Vec<String>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            ap_ip: default_ap_ip(),
            ap_max_clients: default_ap_max_clients(),
            ap_on_delay_secs: default_ap_on_delay_secs(),
            ap_off_delay_secs: default_ap_off_delay_secs(),
            sta_reconnect_delay_secs: default_sta_reconnect_delay_secs(),
            early_boot_grace_secs: default_early_boot_grace_secs(),
            sim_reachable: Vec::new(),
        }
    }
}

fn default_ap_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 4, 1)
}

fn default_ap_max_clients() -> u8 {
    2
}

fn default_ap_on_delay_secs() -> u64 {
    120
}

fn default_ap_off_delay_secs() -> u64 {
    60
}

fn default_sta_reconnect_delay_secs() -> u64 {
    10
}

fn default_early_boot_grace_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AclConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_acl_port")]
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_acl_timeout_ms")]
    pub timeout_ms: u64,
    /// Grant every badge without asking the server
    #[serde(default)]
    pub bypass: bool,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_acl_port(),
            name: String::new(),
            timeout_ms: default_acl_timeout_ms(),
            bypass: false,
        }
    }
}

fn default_acl_port() -> u16 {
    80
}

fn default_acl_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MomentaryConfig {
    /// Hold time after the last grant; 0 follows tag presence exactly
    #[serde(default)]
    pub seconds: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RfidConfig {
    /// Serial device of the reader (empty disables the reader)
    #[serde(default = "default_rfid_device")]
    pub device: String,
    #[serde(default = "default_rfid_baud")]
    pub baud: u32,
    #[serde(default = "default_rfid_quiet_ms")]
    pub quiet_ms: u64,
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            device: default_rfid_device(),
            baud: default_rfid_baud(),
            quiet_ms: default_rfid_quiet_ms(),
        }
    }
}

fn default_rfid_device() -> String {
    "/dev/ttyS1".to_string()
}

fn default_rfid_baud() -> u32 {
    9600
}

fn default_rfid_quiet_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host (empty disables telemetry publishing)
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Defaults to the hostname
    #[serde(default)]
    pub client_name: String,
    /// Defaults to the hostname; status goes to `stat/<topic>`
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Re-publish period while access is granted (0 disables)
    #[serde(default)]
    pub status_period_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            client_name: String::new(),
            topic: String::new(),
            username: None,
            password: None,
            status_period_secs: 0,
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub show_rfids: bool,
    #[serde(default = "default_page_interval_secs")]
    pub page_interval_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { show_rfids: false, page_interval_secs: default_page_interval_secs() }
    }
}

fn default_page_interval_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayConfig {
    /// sysfs GPIO value file driving the door strike (empty = log only)
    #[serde(default)]
    pub gpio_value_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Admin HTTP port (0 disables)
    #[serde(default = "default_admin_http_port")]
    pub http_port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { http_port: default_admin_http_port() }
    }
}

fn default_admin_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub wifi: WifiConfig,
    #[serde(default)]
    pub acl: AclConfig,
    #[serde(default)]
    pub momentary: MomentaryConfig,
    #[serde(default)]
    pub rfid: RfidConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    hostname: String,
    admin_password: String,
    credentials: [Credential; CREDENTIAL_SLOTS],
    ap_ip: Ipv4Addr,
    ap_max_clients: u8,
    ap_on_delay_secs: u64,
    ap_off_delay_secs: u64,
    sta_reconnect_delay_secs: u64,
    early_boot_grace_secs: u64,
    sim_reachable: Vec<String>,
    acl_host: String,
    acl_port: u16,
    acl_name: String,
    acl_timeout_ms: u64,
    acl_bypass: bool,
    momentary_seconds: u16,
    rfid_device: String,
    rfid_baud: u32,
    rfid_quiet_ms: u64,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_name: String,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_status_period_secs: u16,
    display_show_rfids: bool,
    display_page_interval_secs: u64,
    relay_gpio_value_path: String,
    admin_http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { device, wifi, acl, momentary, rfid, mqtt, display, relay, admin } =
            toml_config;

        if wifi.networks.len() > CREDENTIAL_SLOTS {
            warn!(
                configured = wifi.networks.len(),
                slots = CREDENTIAL_SLOTS,
                "config_extra_wifi_networks_ignored"
            );
        }
        if display.page_interval_secs == 0 {
            warn!("config_page_interval_zero_using_1s");
        }
        let mut credentials: [Credential; CREDENTIAL_SLOTS] = Default::default();
        for (slot, entry) in credentials.iter_mut().zip(wifi.networks) {
            *slot = Credential::new(entry.ssid, entry.password);
        }

        Self {
            config_file,
            hostname: device.hostname,
            admin_password: device.admin_password,
            credentials,
            ap_ip: wifi.ap_ip,
            ap_max_clients: wifi.ap_max_clients,
            ap_on_delay_secs: wifi.ap_on_delay_secs,
            ap_off_delay_secs: wifi.ap_off_delay_secs,
            sta_reconnect_delay_secs: wifi.sta_reconnect_delay_secs,
            early_boot_grace_secs: wifi.early_boot_grace_secs,
            sim_reachable: wifi.sim_reachable,
            acl_host: acl.host,
            acl_port: acl.port,
            acl_name: acl.name,
            acl_timeout_ms: acl.timeout_ms,
            acl_bypass: acl.bypass,
            momentary_seconds: momentary.seconds,
            rfid_device: rfid.device,
            rfid_baud: rfid.baud,
            rfid_quiet_ms: rfid.quiet_ms,
            mqtt_host: mqtt.host,
            mqtt_port: mqtt.port,
            mqtt_client_name: mqtt.client_name,
            mqtt_topic: mqtt.topic,
            mqtt_username: mqtt.username,
            mqtt_password: mqtt.password,
            mqtt_status_period_secs: mqtt.status_period_secs,
            display_show_rfids: display.show_rfids,
            display_page_interval_secs: display.page_interval_secs.max(1),
            relay_gpio_value_path: relay.gpio_value_path,
            admin_http_port: admin.http_port,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// True if at least one credential slot is populated
    pub fn any_credentials(&self) -> bool {
        self.credentials.iter().any(|c| !c.is_empty())
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    pub fn credentials(&self) -> &[Credential; CREDENTIAL_SLOTS] {
        &self.credentials
    }

    pub fn ap_ip(&self) -> Ipv4Addr {
        self.ap_ip
    }

    pub fn ap_max_clients(&self) -> u8 {
        self.ap_max_clients
    }

    pub fn ap_on_delay(&self) -> Duration {
        Duration::from_secs(self.ap_on_delay_secs)
    }

    pub fn ap_off_delay(&self) -> Duration {
        Duration::from_secs(self.ap_off_delay_secs)
    }

    pub fn sta_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.sta_reconnect_delay_secs)
    }

    pub fn early_boot_grace(&self) -> Duration {
        Duration::from_secs(self.early_boot_grace_secs)
    }

    pub fn sim_reachable(&self) -> &[String] {
        &self.sim_reachable
    }

    pub fn acl_host(&self) -> &str {
        &self.acl_host
    }

    pub fn acl_port(&self) -> u16 {
        self.acl_port
    }

    pub fn acl_name(&self) -> &str {
        &self.acl_name
    }

    pub fn acl_timeout(&self) -> Duration {
        Duration::from_millis(self.acl_timeout_ms)
    }

    pub fn acl_bypass(&self) -> bool {
        self.acl_bypass
    }

    pub fn momentary_seconds(&self) -> u16 {
        self.momentary_seconds
    }

    pub fn rfid_device(&self) -> &str {
        &self.rfid_device
    }

    pub fn rfid_baud(&self) -> u32 {
        self.rfid_baud
    }

    pub fn rfid_quiet(&self) -> Duration {
        Duration::from_millis(self.rfid_quiet_ms)
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_name(&self) -> &str {
        &self.mqtt_client_name
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_status_period_secs(&self) -> u16 {
        self.mqtt_status_period_secs
    }

    pub fn display_show_rfids(&self) -> bool {
        self.display_show_rfids
    }

    pub fn display_page_interval(&self) -> Duration {
        Duration::from_secs(self.display_page_interval_secs)
    }

    pub fn relay_gpio_value_path(&self) -> &str {
        &self.relay_gpio_value_path
    }

    pub fn admin_http_port(&self) -> u16 {
        self.admin_http_port
    }

    /// Builder method for tests to set the momentary hold time
    pub fn with_momentary_seconds(mut self, seconds: u16) -> Self {
        self.momentary_seconds = seconds;
        self
    }

    /// Builder method for tests to populate credential slots
    pub fn with_credentials(mut self, credentials: [Credential; CREDENTIAL_SLOTS]) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builder method for tests to point the ACL client somewhere
    pub fn with_acl(mut self, host: &str, port: u16, name: &str) -> Self {
        self.acl_host = host.to_string();
        self.acl_port = port;
        self.acl_name = name.to_string();
        self
    }

    /// Builder method for tests to shorten the ACL round trip timeout
    pub fn with_acl_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acl_timeout_ms = timeout_ms;
        self
    }

    /// Builder method for tests to toggle the ACL bypass
    pub fn with_acl_bypass(mut self, bypass: bool) -> Self {
        self.acl_bypass = bypass;
        self
    }

    /// Builder method for tests to set the telemetry re-publish period
    pub fn with_mqtt_status_period_secs(mut self, secs: u16) -> Self {
        self.mqtt_status_period_secs = secs;
        self
    }
}
