//! Infrastructure - configuration, component queues and timers
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `mailbox` - Bounded component queues and the fatal-abort path
//! - `timer` - One-shot and periodic timers that post into a mailbox

pub mod config;
pub mod mailbox;
pub mod timer;

// Re-export commonly used types
pub use config::Config;
pub use mailbox::{fatal, mailbox, Mailbox, QUEUE_DEPTH};
pub use timer::{Epoch, OneShotTimer, PeriodicTimer};
