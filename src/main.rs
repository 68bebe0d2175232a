//! Badge gate - RFID door controller
//!
//! A badge read on the RFID reader is checked against the remote allow-list
//! server; the result drives the door strike relay, the status display and
//! MQTT telemetry. The single WiFi radio is shared between a configuration
//! access point and the upstream station link.
//!
//! Module structure:
//! - `domain/` - Core types (TagId, AccessResult, NetStatus)
//! - `io/` - External interfaces (RFID serial, ACL HTTP, relay, MQTT, radio)
//! - `services/` - Component tasks (gate, dispatcher, sinks, net manager)
//! - `infra/` - Infrastructure (Config, queues, timers)

use badge_gate::infra::Config;
use badge_gate::io::{
    create_mqtt_publisher, relay_from_config, start_admin_server, AclClient, AdminState, LogPanel,
    MqttSettings, MqttState, NullPublisher, RfidReader, SimRadio, StatusPublisher, WifiRadio,
};
use badge_gate::services::{
    create_dispatcher, create_display_sink, create_momentary_gate, create_net_manager,
    create_relay_sink, create_telemetry_sink, resolve_hostname, AccessSink, DisplaySettings,
    SinkList,
};
use clap::Parser;
use smallvec::smallvec;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Locally administered MAC used by the simulated radio
const SIM_MAC: [u8; 6] = [0x02, 0xb4, 0xd9, 0x00, 0x00, 0x01];

/// Badge gate - RFID access control appliance
#[derive(Parser, Debug)]
#[command(name = "badge-gate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    // RUST_LOG overrides; default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.json_logs);

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "badge-gate starting");

    let config = Config::load_from_path(&args.config);

    let radio = SimRadio::new(SIM_MAC, config.sim_reachable().to_vec());
    let hostname = resolve_hostname(config.hostname(), radio.base_mac());

    info!(
        config_file = %config.config_file(),
        hostname = %hostname,
        credentials = %config.any_credentials(),
        acl_host = %config.acl_host(),
        acl_port = %config.acl_port(),
        acl_name = %config.acl_name(),
        acl_bypass = %config.acl_bypass(),
        momentary_secs = %config.momentary_seconds(),
        rfid_device = %config.rfid_device(),
        mqtt_host = %config.mqtt_host(),
        admin_http_port = %config.admin_http_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Network manager owns the radio
    let (net, net_manager) = create_net_manager(&config, hostname.clone(), Box::new(radio));
    tokio::spawn(net_manager.run());

    // MQTT telemetry, started on the first station IP
    let (publisher, mqtt_state, mqtt_client_name) =
        match MqttSettings::from_config(&config, &hostname) {
            Some(settings) => {
                let (publisher, connection, state) = create_mqtt_publisher(&settings);
                tokio::spawn(connection.run(net.subscribe(), shutdown_rx.clone()));
                (Arc::new(publisher) as Arc<dyn StatusPublisher>, state, settings.client_name)
            }
            None => {
                info!("mqtt_disabled");
                let (_tx, state) = watch::channel(MqttState::Disabled);
                (Arc::new(NullPublisher) as Arc<dyn StatusPublisher>, state, String::new())
            }
        };

    // Access sinks
    let (relay_handle, relay_sink) = create_relay_sink(relay_from_config(&config));
    let relay_task = tokio::spawn(relay_sink.run(shutdown_rx.clone()));

    let show_rfids = Arc::new(AtomicBool::new(false));
    let display_settings = DisplaySettings {
        hostname: hostname.clone(),
        admin_protected: !config.admin_password().is_empty(),
        mqtt_client_name,
        show_rfids: config.display_show_rfids(),
        page_interval: config.display_page_interval(),
    };
    let (display_handle, display_sink) = create_display_sink(
        display_settings,
        Box::new(LogPanel::default()),
        show_rfids.clone(),
        net.subscribe(),
        mqtt_state.clone(),
    );
    tokio::spawn(display_sink.run());

    let (telemetry_handle, telemetry_sink) =
        create_telemetry_sink(publisher, config.mqtt_status_period_secs());
    tokio::spawn(telemetry_sink.run());

    // Presence pipeline: reader -> momentary gate -> dispatcher -> sinks
    let acl_bypass = Arc::new(AtomicBool::new(config.acl_bypass()));
    let sinks: SinkList = smallvec![
        Arc::new(relay_handle) as Arc<dyn AccessSink>,
        Arc::new(display_handle) as Arc<dyn AccessSink>,
        Arc::new(telemetry_handle) as Arc<dyn AccessSink>,
    ];
    let (dispatcher_handle, dispatcher) =
        create_dispatcher(Arc::new(AclClient::new(&config, &hostname)), acl_bypass.clone(), sinks);
    tokio::spawn(dispatcher.run());

    let (gate_handle, gate) =
        create_momentary_gate(config.momentary_seconds(), Arc::new(dispatcher_handle));
    tokio::spawn(gate.run());

    let reader = RfidReader::new(&config, Arc::new(gate_handle));
    tokio::spawn(reader.run(shutdown_rx.clone()));

    // Admin HTTP endpoint (if port > 0)
    let admin_port = config.admin_http_port();
    if admin_port > 0 {
        let state = AdminState {
            net: net.clone(),
            mqtt: mqtt_state,
            acl_bypass,
            show_rfids,
            shutdown: shutdown_tx.clone(),
        };
        let admin_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_admin_server(admin_port, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin HTTP server error");
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    let mut shutdown = shutdown_rx;
    let _ = shutdown.wait_for(|stop| *stop).await;

    // The strike pin keeps its level after exit
    if let Err(e) = relay_task.await {
        tracing::error!(error = %e, "relay_task_failed");
    }

    info!("badge-gate shutdown complete");
    Ok(())
}
