//! Shared helpers for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How the mock ACL server answers a request path
pub type Reply = fn(&str) -> (Duration, &'static str);

/// A request seen by the mock server
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub user_agent: String,
}

/// ACL server on an ephemeral local port
pub struct MockAcl {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockAcl {
    pub fn paths(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.path.clone()).collect()
    }
}

pub async fn start_mock_acl(reply: Reply) -> MockAcl {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let seen = seen.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let seen = seen.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let user_agent = req
                            .headers()
                            .get(hyper::header::USER_AGENT)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        seen.lock().push(SeenRequest { path: path.clone(), user_agent });

                        let (delay, body) = reply(&path);
                        tokio::time::sleep(delay).await;
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body))))
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    MockAcl { addr, requests }
}

/// Allow only tag 12345
pub fn allow_12345(path: &str) -> (Duration, &'static str) {
    if path.ends_with("/12345") {
        (Duration::ZERO, "True")
    } else {
        (Duration::ZERO, "False")
    }
}

/// Never answer within any sane timeout
pub fn too_slow(_path: &str) -> (Duration, &'static str) {
    (Duration::from_secs(5), "True")
}
