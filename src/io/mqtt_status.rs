//! MQTT status publisher
//!
//! Publishes the telemetry sink's status payload to `stat/<topic>` (QoS 1).
//! The connection is only brought up once the station interface first gets
//! an IP address; before that, and whenever the broker link is down,
//! publishes are dropped.

use crate::domain::types::NetStatus;
use crate::infra::config::Config;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Broker link state, shown on the display and the admin endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MqttState {
    /// Host, client name or topic not configured
    Disabled,
    Disconnected,
    Connected,
}

/// Capability to publish one status document
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(&self, payload: &str);
}

/// Resolved broker settings; client name and topic fall back to the hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_name: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttSettings {
    /// `None` when telemetry is disabled
    pub fn from_config(config: &Config, hostname: &str) -> Option<Self> {
        let or_hostname = |value: &str| {
            if value.is_empty() {
                hostname.to_string()
            } else {
                value.to_string()
            }
        };
        let settings = Self {
            host: config.mqtt_host().to_string(),
            port: config.mqtt_port(),
            client_name: or_hostname(config.mqtt_client_name()),
            topic: or_hostname(config.mqtt_topic()),
            username: config.mqtt_username().map(str::to_string),
            password: config.mqtt_password().map(str::to_string),
        };
        if settings.host.is_empty() || settings.client_name.is_empty() || settings.topic.is_empty() {
            return None;
        }
        Some(settings)
    }

    pub fn stat_topic(&self) -> String {
        format!("stat/{}", self.topic)
    }
}

/// Publishing half, owned by the telemetry sink
pub struct MqttStatusPublisher {
    client: AsyncClient,
    topic: String,
    state: watch::Receiver<MqttState>,
}

#[async_trait]
impl StatusPublisher for MqttStatusPublisher {
    async fn publish_status(&self, payload: &str) {
        if *self.state.borrow() != MqttState::Connected {
            error!(payload = %payload, "mqtt_disconnected_publish_dropped");
            return;
        }
        if let Err(e) =
            self.client.publish(&self.topic, QoS::AtLeastOnce, false, payload.as_bytes()).await
        {
            error!(error = %e, "mqtt_publish_failed");
        }
    }
}

/// Publisher used when telemetry is disabled
pub struct NullPublisher;

#[async_trait]
impl StatusPublisher for NullPublisher {
    async fn publish_status(&self, payload: &str) {
        debug!(payload = %payload, "mqtt_disabled_publish_skipped");
    }
}

/// Connection half: drives the rumqttc event loop
pub struct MqttConnection {
    eventloop: EventLoop,
    state_tx: watch::Sender<MqttState>,
    host: String,
    port: u16,
}

impl MqttConnection {
    /// Wait for the first station IP, then keep the broker link serviced
    pub async fn run(
        mut self,
        mut net: watch::Receiver<NetStatus>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let online = tokio::select! {
            res = net.wait_for(|s| s.sta.has_ip) => res.is_ok(),
            _ = shutdown.changed() => false,
        };
        if !online {
            return;
        }
        info!(host = %self.host, port = %self.port, "mqtt_client_starting");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_client_shutdown");
                        return;
                    }
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                        self.state_tx.send_replace(MqttState::Connected);
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if self.state_tx.send_replace(MqttState::Disconnected)
                            == MqttState::Connected
                        {
                            warn!(error = %e, "mqtt_disconnected");
                        } else {
                            debug!(error = %e, "mqtt_connect_failed");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
    }
}

/// Build the publisher, its connection driver and a state receiver
pub fn create_mqtt_publisher(
    settings: &MqttSettings,
) -> (MqttStatusPublisher, MqttConnection, watch::Receiver<MqttState>) {
    let mut options = MqttOptions::new(&settings.client_name, &settings.host, settings.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username, password);
    }

    let (client, eventloop) = AsyncClient::new(options, 100);
    let (state_tx, state_rx) = watch::channel(MqttState::Disconnected);

    let publisher =
        MqttStatusPublisher { client, topic: settings.stat_topic(), state: state_rx.clone() };
    let connection =
        MqttConnection { eventloop, state_tx, host: settings.host.clone(), port: settings.port };
    (publisher, connection, state_rx)
}
