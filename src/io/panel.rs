//! Status display panel
//!
//! The display task composes a `Screen` and hands it to a `DisplayPanel`.
//! Pixel-level rendering belongs to the panel implementation.

use tracing::info;

/// Background tone, keyed off the last access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Granted,
    Denied,
    Error,
    Idle,
}

/// One composed display frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub background: Tone,
    /// Status bar: network and telemetry both healthy
    pub status_ok: bool,
}

/// Capability to put a frame on the panel
pub trait DisplayPanel: Send {
    fn show(&mut self, screen: &Screen);
}

/// Panel that logs each distinct frame
#[derive(Default)]
pub struct LogPanel {
    last: Option<Screen>,
}

impl DisplayPanel for LogPanel {
    fn show(&mut self, screen: &Screen) {
        if self.last.as_ref() == Some(screen) {
            return;
        }
        info!(
            text = %screen.text.replace('\n', " | "),
            background = ?screen.background,
            status_ok = %screen.status_ok,
            "display_frame"
        );
        self.last = Some(screen.clone());
    }
}
