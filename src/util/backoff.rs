//! Spin-then-yield backoff and the wait/notify seam built on it
//!
//! Queue drain cycles are short, so the default waiter spins with an
//! exponentially growing number of `spin_loop` hints, then falls back to
//! `thread::yield_now`. `BlockingWaiter` parks on a condition variable
//! instead; call sites only see the `Waiter` trait.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::BackoffConfig;

/// Bounded exponential backoff state for one waiting loop
#[derive(Debug, Clone)]
pub struct Backoff {
  step: u32,
  spin_limit: u32,
  yield_limit: u32,
}

impl Backoff {
  pub fn new(config: &BackoffConfig) -> Self {
    Self {
      step: 0,
      spin_limit: config.spin_limit,
      yield_limit: config.yield_limit.max(config.spin_limit),
    }
  }

  /// Spin while below the spin limit, then yield the thread
  pub fn snooze(&mut self) {
    if self.step <= self.spin_limit {
      for _ in 0..(1u32 << self.step) {
        std::hint::spin_loop();
      }
    } else {
      thread::yield_now();
    }
    if self.step <= self.yield_limit {
      self.step += 1;
    }
  }

  /// True once the loop has gone past the yield limit
  pub fn is_completed(&self) -> bool {
    self.step > self.yield_limit
  }

  pub fn reset(&mut self) {
    self.step = 0;
  }
}

/// Wait/notify seam between queue producers and consumers
pub trait Waiter: Send + Sync {
  /// Block or spin briefly until progress may be possible
  fn wait(&self, backoff: &mut Backoff);
  /// Wake waiters after making progress
  fn notify(&self);
}

/// Busy-wait waiter: spin, then yield
#[derive(Debug, Default)]
pub struct SpinYieldWaiter;

impl Waiter for SpinYieldWaiter {
  fn wait(&self, backoff: &mut Backoff) {
    backoff.snooze();
  }

  fn notify(&self) {}
}

/// Waiter that parks on a condition variable once spinning is exhausted
#[derive(Debug)]
pub struct BlockingWaiter {
  signaled: Mutex<bool>,
  cond: Condvar,
  timeout: Duration,
}

impl BlockingWaiter {
  pub fn new(timeout: Duration) -> Self {
    Self {
      signaled: Mutex::new(false),
      cond: Condvar::new(),
      timeout,
    }
  }
}

impl Default for BlockingWaiter {
  fn default() -> Self {
    Self::new(Duration::from_millis(10))
  }
}

impl Waiter for BlockingWaiter {
  fn wait(&self, backoff: &mut Backoff) {
    if !backoff.is_completed() {
      backoff.snooze();
      return;
    }
    let mut signaled = self.signaled.lock();
    if !*signaled {
      // Timed so a missed notify only costs one timeout
      self.cond.wait_for(&mut signaled, self.timeout);
    }
    *signaled = false;
  }

  fn notify(&self) {
    let mut signaled = self.signaled.lock();
    *signaled = true;
    self.cond.notify_all();
  }
}

/// Build the waiter selected by configuration
pub fn waiter_for(config: &BackoffConfig) -> Arc<dyn Waiter> {
  if config.blocking {
    Arc::new(BlockingWaiter::default())
  } else {
    Arc::new(SpinYieldWaiter)
  }
}
