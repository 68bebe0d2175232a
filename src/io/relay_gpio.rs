//! Door strike relay output
//!
//! On the target board the relay hangs off a GPIO exported through sysfs, so
//! driving it is a write of `1` or `0` to the pin's `value` file. Without a
//! configured path the relay is only logged.

use crate::infra::config::Config;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability to drive the relay coil
#[async_trait]
pub trait RelayOutput: Send + Sync {
    async fn set(&self, energised: bool) -> Result<(), RelayError>;
}

/// sysfs GPIO value file
pub struct GpioRelay {
    path: PathBuf,
}

impl GpioRelay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RelayOutput for GpioRelay {
    async fn set(&self, energised: bool) -> Result<(), RelayError> {
        let level: &[u8] = if energised { b"1" } else { b"0" };
        tokio::fs::write(&self.path, level).await.map_err(|source| RelayError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }
}

/// Stand-in output for boards without a relay
pub struct LogRelay;

#[async_trait]
impl RelayOutput for LogRelay {
    async fn set(&self, energised: bool) -> Result<(), RelayError> {
        info!(energised = %energised, "relay_log_output");
        Ok(())
    }
}

/// Pick the relay output for this configuration
pub fn relay_from_config(config: &Config) -> Box<dyn RelayOutput> {
    match config.relay_gpio_value_path() {
        "" => Box::new(LogRelay),
        path => Box::new(GpioRelay::new(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_gpio_relay_writes_level() {
        let file = NamedTempFile::new().unwrap();
        let relay = GpioRelay::new(file.path());

        relay.set(true).await.unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "1");

        relay.set(false).await.unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_gpio_relay_missing_directory_is_error() {
        let relay = GpioRelay::new("/nonexistent/gpio14/value");
        assert!(matches!(relay.set(true).await, Err(RelayError::Write { .. })));
    }
}
