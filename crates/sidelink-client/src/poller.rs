//! Fixed-interval polling with cooperative cancellation.
//!
//! A [`Ticker`] fires every period. The caller awaits each request before
//! asking for the next tick, so requests from one ticker never overlap; a tick
//! that comes due while a request is still in flight is skipped rather than
//! queued. Requests run through [`Ticker::guard`], which drops them as soon as
//! the [`CancelToken`] fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sidelink_common::{Error, Result};
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Cloneable cancellation flag. Every clone observes the same cancellation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only ends on cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `delay`. Returns `false` if cancelled first.
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = time::sleep(delay) => true,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Ticker {
    interval: Interval,
    cancel: CancelToken,
    ticks: u64,
}

impl Ticker {
    /// The first tick comes one full period after creation. A zero period is
    /// rejected.
    pub fn new(period: Duration, cancel: CancelToken) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::config("tick period must be non-zero"));
        }
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ok(Self {
            interval,
            cancel,
            ticks: 0,
        })
    }

    /// Wait for the next tick. Returns `false` once cancelled.
    pub async fn tick(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.interval.tick() => {
                self.ticks += 1;
                true
            }
        }
    }

    /// Run one tick's work, abandoning it if cancellation arrives first.
    pub async fn guard<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = work => Some(out),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
