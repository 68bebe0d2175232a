//! Remote allow-list check over HTTP
//!
//! `GET /api/check-access-0/{acl}/{id}` on the configured server. The body is
//! a bare `True` or `False`; anything that does not fit that shape is a
//! protocol error rather than a denial.

use crate::domain::types::TagId;
use crate::infra::config::Config;
use async_trait::async_trait;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Bodies this long or longer cannot be `True` or `False`
const MAX_BODY_LEN: u64 = 8;

/// Failure of an ACL round trip
#[derive(Debug, Error)]
pub enum AclError {
    #[error("ACL host or name not configured")]
    NotConfigured,
    #[error("HTTP client unavailable")]
    ClientUnavailable,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response has no content length")]
    UnknownLength,
    #[error("response content length {0} too large")]
    TooLarge(u64),
    #[error("read {read} bytes, expected {expected}")]
    ShortBody { read: usize, expected: u64 },
}

/// Capability to ask whether a tag is allowed
#[async_trait]
pub trait AccessCheck: Send + Sync {
    async fn check(&self, id: TagId) -> Result<bool, AclError>;
}

/// reqwest-backed ACL client
pub struct AclClient {
    host: String,
    port: u16,
    acl_name: String,
    http_client: Option<reqwest::Client>,
}

impl AclClient {
    pub fn new(config: &Config, hostname: &str) -> Self {
        // Created once for connection reuse
        let http_client = reqwest::Client::builder()
            .timeout(config.acl_timeout())
            .connect_timeout(config.acl_timeout())
            .user_agent(format!("{} badge-gate ACL client", hostname))
            .http1_only()
            .build()
            .ok();

        Self {
            host: config.acl_host().to_string(),
            port: config.acl_port(),
            acl_name: config.acl_name().to_string(),
            http_client,
        }
    }

    fn url(&self, id: TagId) -> String {
        format!("http://{}:{}/api/check-access-0/{}/{}", self.host, self.port, self.acl_name, id)
    }

    async fn fetch(&self, id: TagId) -> Result<bool, AclError> {
        if self.host.is_empty() || self.acl_name.is_empty() {
            return Err(AclError::NotConfigured);
        }
        let client = self.http_client.as_ref().ok_or(AclError::ClientUnavailable)?;

        let response = client.get(self.url(id)).send().await?;
        let status = response.status();
        let content_length = response.content_length().ok_or(AclError::UnknownLength)?;
        if content_length >= MAX_BODY_LEN {
            return Err(AclError::TooLarge(content_length));
        }

        let body = response.bytes().await?;
        if body.len() as u64 != content_length {
            return Err(AclError::ShortBody { read: body.len(), expected: content_length });
        }
        debug!(id = %id, status = %status, content_length = %content_length, "acl_response");

        Ok(body.as_ref() == b"True")
    }
}

#[async_trait]
impl AccessCheck for AclClient {
    async fn check(&self, id: TagId) -> Result<bool, AclError> {
        let start = Instant::now();
        let result = self.fetch(id).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(allowed) => {
                info!(id = %id, allowed = %allowed, latency_ms = %latency_ms, "acl_check");
            }
            Err(e) => {
                error!(id = %id, error = %e, latency_ms = %latency_ms, "acl_check_error");
            }
        }
        result
    }
}
