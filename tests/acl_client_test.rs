//! Integration tests for the ACL client against a local HTTP server

mod common;

use badge_gate::domain::types::TagId;
use badge_gate::infra::Config;
use badge_gate::io::{AccessCheck, AclClient, AclError};
use common::{allow_12345, start_mock_acl, too_slow};
use std::time::Duration;

fn client_for(addr: std::net::SocketAddr, timeout_ms: u64) -> AclClient {
    let config = Config::default()
        .with_acl(&addr.ip().to_string(), addr.port(), "front-door")
        .with_acl_timeout_ms(timeout_ms);
    AclClient::new(&config, "badge-test")
}

#[tokio::test]
async fn test_true_body_is_allowed() {
    let server = start_mock_acl(allow_12345).await;
    let client = client_for(server.addr, 1000);

    assert!(client.check(TagId(12345)).await.unwrap());

    let requests = server.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/check-access-0/front-door/12345");
    assert_eq!(requests[0].user_agent, "badge-test badge-gate ACL client");
}

#[tokio::test]
async fn test_false_body_is_denied() {
    let server = start_mock_acl(allow_12345).await;
    let client = client_for(server.addr, 1000);

    assert!(!client.check(TagId(777)).await.unwrap());
}

#[tokio::test]
async fn test_unexpected_short_body_is_denied() {
    let server = start_mock_acl(|_| (Duration::ZERO, "yes")).await;
    let client = client_for(server.addr, 1000);

    assert!(!client.check(TagId(1)).await.unwrap());
}

#[tokio::test]
async fn test_oversized_body_is_error() {
    let server = start_mock_acl(|_| (Duration::ZERO, "True, welcome in")).await;
    let client = client_for(server.addr, 1000);

    assert!(matches!(client.check(TagId(1)).await, Err(AclError::TooLarge(16))));
}

#[tokio::test]
async fn test_timeout_is_error() {
    let server = start_mock_acl(too_slow).await;
    let client = client_for(server.addr, 200);

    let started = std::time::Instant::now();
    let result = client.check(TagId(12345)).await;
    assert!(matches!(result, Err(AclError::Transport(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_connection_refused_is_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(addr, 500);
    assert!(matches!(client.check(TagId(1)).await, Err(AclError::Transport(_))));
}
