//! Software timers that deliver into a component queue
//!
//! Timers never touch component state. When one fires it posts a message
//! into the owner's mailbox, and the owner decides whether the message is
//! still current. Stopping a timer aborts its task, but a message that was
//! already queued still arrives: owners tag messages with an epoch or
//! generation and discard stale ones.

use crate::infra::mailbox::Mailbox;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::trace;

/// Monotonic generation counter carried by timer messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Epoch(u32);

impl Epoch {
    /// Advance to the next generation and return it
    #[inline]
    pub fn bump(&mut self) -> u32 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    #[inline]
    pub fn current(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn matches(&self, captured: u32) -> bool {
        self.0 == captured
    }
}

/// Single-shot timer
pub struct OneShotTimer<M> {
    name: &'static str,
    delay: Duration,
    mailbox: Mailbox<M>,
    handle: Option<JoinHandle<()>>,
}

impl<M: Send + 'static> OneShotTimer<M> {
    pub fn new(name: &'static str, delay: Duration, mailbox: Mailbox<M>) -> Self {
        Self { name, delay, mailbox, handle: None }
    }

    /// (Re)start the timer; `msg` is posted when it expires
    pub fn start(&mut self, msg: M) {
        self.stop();
        let mailbox = self.mailbox.clone();
        let delay = self.delay;
        let name = self.name;
        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            trace!(timer = %name, "timer_expired");
            mailbox.post(msg).await;
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<M> Drop for OneShotTimer<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Shortest period a periodic timer will run at
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Auto-reloading timer; the first tick comes one period after `start`
pub struct PeriodicTimer<M> {
    name: &'static str,
    period: Duration,
    mailbox: Mailbox<M>,
    handle: Option<JoinHandle<()>>,
}

impl<M: Clone + Send + 'static> PeriodicTimer<M> {
    /// A zero period is raised to `MIN_PERIOD`
    pub fn new(name: &'static str, period: Duration, mailbox: Mailbox<M>) -> Self {
        Self { name, period: period.max(MIN_PERIOD), mailbox, handle: None }
    }

    /// (Re)start the timer; a clone of `msg` is posted on every tick
    pub fn start(&mut self, msg: M) {
        self.stop();
        let mailbox = self.mailbox.clone();
        let period = self.period;
        let name = self.name;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!(timer = %name, "timer_tick");
                mailbox.post(msg.clone()).await;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl<M> Drop for PeriodicTimer<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::mailbox::mailbox;

    #[test]
    fn test_epoch_bump_and_match() {
        let mut epoch = Epoch::default();
        let first = epoch.bump();
        assert!(epoch.matches(first));
        let second = epoch.bump();
        assert!(!epoch.matches(first));
        assert!(epoch.matches(second));
        assert_eq!(epoch.current(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once_after_delay() {
        let (mb, mut rx) = mailbox::<u32>("timer_test", 8);
        let mut timer = OneShotTimer::new("t", Duration::from_secs(5), mb);
        let started = Instant::now();
        timer.start(42);

        assert_eq!(rx.recv().await, Some(42));
        assert!(started.elapsed() >= Duration::from_secs(5));

        sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_restart_replaces_pending_fire() {
        let (mb, mut rx) = mailbox::<u32>("timer_test", 8);
        let mut timer = OneShotTimer::new("t", Duration::from_secs(5), mb);
        timer.start(1);
        sleep(Duration::from_secs(3)).await;
        timer.start(2);

        assert_eq!(rx.recv().await, Some(2));
        sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_stop_prevents_fire() {
        let (mb, mut rx) = mailbox::<u32>("timer_test", 8);
        let mut timer = OneShotTimer::new("t", Duration::from_secs(5), mb);
        timer.start(1);
        timer.stop();
        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_until_stopped() {
        let (mb, mut rx) = mailbox::<u32>("timer_test", 8);
        let mut timer = PeriodicTimer::new("p", Duration::from_secs(2), mb);
        timer.start(7);

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, Some(7));
        timer.stop();
        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_zero_period_still_ticks() {
        let (mb, mut rx) = mailbox::<u32>("timer_test", 8);
        let mut timer = PeriodicTimer::new("p", Duration::ZERO, mb);
        timer.start(3);

        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(3));
        timer.stop();
    }
}
