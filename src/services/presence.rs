//! Presence edges and the tag debouncer
//!
//! The reader produces a read every time a complete frame arrives, which for
//! a badge held against the antenna is several times per second. The
//! debouncer collapses that stream into `present(id)` / `absent()` edges.

use crate::domain::types::{PresenceEvent, TagId};
use async_trait::async_trait;
use smallvec::{smallvec, SmallVec};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Consumer of debounced presence edges
#[async_trait]
pub trait PresenceListener: Send + Sync {
    async fn present(&self, id: TagId);
    async fn absent(&self);
}

/// Route one edge to a listener
pub async fn forward(listener: &dyn PresenceListener, event: PresenceEvent) {
    match event {
        PresenceEvent::Present(id) => listener.present(id).await,
        PresenceEvent::Absent => listener.absent().await,
    }
}

/// Edges produced by a single read; at most absent followed by present
pub type Edges = SmallVec<[PresenceEvent; 2]>;

/// Debounce state for the tag currently on the antenna
#[derive(Debug)]
pub struct PresenceDebouncer {
    current: Option<TagId>,
    last_seen: Instant,
    quiet: Duration,
}

impl PresenceDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { current: None, last_seen: Instant::now(), quiet }
    }

    /// Feed one decoded read
    pub fn on_read(&mut self, id: TagId, now: Instant) -> Edges {
        self.last_seen = now;
        match self.current {
            Some(current) if current == id => SmallVec::new(),
            Some(previous) => {
                debug!(previous = %previous, id = %id, "presence_tag_swapped");
                self.current = Some(id);
                smallvec![PresenceEvent::Absent, PresenceEvent::Present(id)]
            }
            None => {
                self.current = Some(id);
                smallvec![PresenceEvent::Present(id)]
            }
        }
    }

    /// Emit `absent` once the present tag has been quiet long enough
    pub fn check_quiet(&mut self, now: Instant) -> Option<PresenceEvent> {
        let current = self.current?;
        if now.saturating_duration_since(self.last_seen) >= self.quiet {
            debug!(id = %current, "presence_quiet_timeout");
            self.current = None;
            Some(PresenceEvent::Absent)
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<TagId> {
        self.current
    }
}
