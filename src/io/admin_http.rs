//! Admin HTTP endpoint
//!
//! Exposes the live status and the runtime actions:
//! - `GET /status` - network snapshot, MQTT state, runtime toggles (JSON)
//! - `POST /actions/acl-bypass` - toggle "allow any RFID"
//! - `POST /actions/show-rfids` - toggle showing tag ids on the display
//! - `POST /actions/restart` - stop station reconnects, then shut down

use crate::domain::types::NetStatus;
use crate::io::mqtt_status::MqttState;
use crate::services::net_manager::NetHandle;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Everything the endpoint reads or flips
#[derive(Clone)]
pub struct AdminState {
    pub net: NetHandle,
    pub mqtt: watch::Receiver<MqttState>,
    pub acl_bypass: Arc<AtomicBool>,
    pub show_rfids: Arc<AtomicBool>,
    /// Set to true to shut the process down
    pub shutdown: Arc<watch::Sender<bool>>,
}

#[derive(Serialize)]
struct StatusBody {
    net: NetStatus,
    mqtt: MqttState,
    acl_bypass: bool,
    show_rfids: bool,
    version: &'static str,
    /// RFC 3339 UTC time the snapshot was taken
    time: String,
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn toggle(flag: &AtomicBool) -> bool {
    !flag.fetch_xor(true, Ordering::Relaxed)
}

/// Handle one admin request
pub async fn handle_request<B>(req: Request<B>, state: AdminState) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    drop(req);

    match (&method, path.as_str()) {
        (&Method::GET, "/status") => {
            let body = StatusBody {
                net: state.net.status(),
                mqtt: *state.mqtt.borrow(),
                acl_bypass: state.acl_bypass.load(Ordering::Relaxed),
                show_rfids: state.show_rfids.load(Ordering::Relaxed),
                version: env!("CARGO_PKG_VERSION"),
                time: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            };
            match serde_json::to_string(&body) {
                Ok(json) => json_response(StatusCode::OK, json),
                Err(e) => json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "ok": false, "error": e.to_string() }).to_string(),
                ),
            }
        }
        (&Method::POST, "/actions/acl-bypass") => {
            let enabled = toggle(&state.acl_bypass);
            info!(enabled = %enabled, "admin_acl_bypass_toggled");
            json_response(StatusCode::OK, serde_json::json!({ "acl_bypass": enabled }).to_string())
        }
        (&Method::POST, "/actions/show-rfids") => {
            let enabled = toggle(&state.show_rfids);
            info!(enabled = %enabled, "admin_show_rfids_toggled");
            json_response(StatusCode::OK, serde_json::json!({ "show_rfids": enabled }).to_string())
        }
        (&Method::POST, "/actions/restart") => {
            info!("admin_restart_requested");
            state.net.notify_upcoming_restart().await;
            let _ = state.shutdown.send(true);
            json_response(StatusCode::OK, r#"{"ok":true}"#.to_string())
        }
        _ => {
            json_response(StatusCode::NOT_FOUND, r#"{"ok":false,"error":"not_found"}"#.to_string())
        }
    }
}

/// Serve the admin endpoint on `port` until shutdown
pub async fn start_admin_server(
    port: u16,
    state: AdminState,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "admin_http_server_started");
    serve(listener, state, shutdown).await;
    Ok(())
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, state: AdminState, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { Ok::<_, Infallible>(handle_request(req, state).await) }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "admin_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "admin_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("admin_http_server_shutdown");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;
    use crate::io::radio::SimRadio;
    use crate::services::net_manager::{create_net_manager, NetMsg};
    use http_body_util::BodyExt;

    struct Fixture {
        state: AdminState,
        shutdown_rx: watch::Receiver<bool>,
        net_rx: tokio::sync::mpsc::Receiver<NetMsg>,
    }

    fn fixture() -> Fixture {
        let radio = SimRadio::new([0; 6], vec![]);
        let (net, manager) =
            create_net_manager(&Config::default(), "badge".to_string(), Box::new(radio));
        let (_mqtt_tx, mqtt) = watch::channel(MqttState::Disabled);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AdminState {
            net,
            mqtt,
            acl_bypass: Arc::new(AtomicBool::new(false)),
            show_rfids: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(shutdown_tx),
        };
        Fixture { state, shutdown_rx, net_rx: manager.rx }
    }

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder().method(method).uri(path).body(()).unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_snapshot_and_toggles() {
        let f = fixture();
        let response = handle_request(request(Method::GET, "/status"), f.state.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["net"]["ap"]["enabled"], true);
        assert_eq!(json["net"]["ap"]["network"], "badge");
        assert_eq!(json["mqtt"], "disabled");
        assert_eq!(json["acl_bypass"], false);
        assert!(json["time"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_toggles_flip_and_report_new_value() {
        let f = fixture();
        let post = |path| handle_request(request(Method::POST, path), f.state.clone());

        let json = body_json(post("/actions/acl-bypass").await).await;
        assert_eq!(json["acl_bypass"], true);
        assert!(f.state.acl_bypass.load(Ordering::Relaxed));

        post("/actions/acl-bypass").await;
        assert!(!f.state.acl_bypass.load(Ordering::Relaxed));

        let json = body_json(post("/actions/show-rfids").await).await;
        assert_eq!(json["show_rfids"], true);
    }

    #[tokio::test]
    async fn test_restart_notifies_net_manager_and_shuts_down() {
        let mut f = fixture();
        let response =
            handle_request(request(Method::POST, "/actions/restart"), f.state.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(f.net_rx.try_recv().unwrap(), NetMsg::RestartPending);
        assert!(*f.shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let f = fixture();
        let response =
            handle_request(request(Method::GET, "/actions/restart"), f.state.clone()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
