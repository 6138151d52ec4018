//! Log runner
//!
//! Producers push raw log lines into a bounded queue; one apply thread per
//! partition drains it into its `GraphStore`. A full queue makes producers
//! back off, an empty one makes the apply thread back off, both through the
//! configured `Waiter`. Dropping the producer side ends the apply loop, which
//! finalizes the epoch in flight before handing the store back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info};

use crate::config::BackoffConfig;
use crate::constants::NO_EPOCH_PUBLISHED;
use crate::error::{GraphError, Result};
use crate::store::GraphStore;
use crate::types::Epoch;
use crate::util::backoff::{waiter_for, Backoff, Waiter};

/// What an apply thread did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerStats {
  pub lines: u64,
  pub applied: u64,
  pub skipped: u64,
  pub idle_waits: u64,
}

/// Queue plus apply thread for one partition
pub struct LogRunner {
  fid: u64,
  sender: Option<Sender<String>>,
  handle: Option<JoinHandle<Result<(GraphStore, RunnerStats)>>>,
  /// Wakes the apply thread when lines arrive
  consumer: Arc<dyn Waiter>,
  /// Wakes producers when the queue drains
  producer: Arc<dyn Waiter>,
  backoff: BackoffConfig,
  latest: Arc<AtomicU64>,
}

impl std::fmt::Debug for LogRunner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogRunner")
      .field("fid", &self.fid)
      .field("running", &self.handle.is_some())
      .finish()
  }
}

impl LogRunner {
  /// Move `store` onto its own apply thread
  pub fn spawn(store: GraphStore) -> Result<Self> {
    let fid = store.fid();
    let backoff = store.config().backoff.clone();
    let (sender, receiver) = bounded(store.config().queue_capacity);
    let consumer = waiter_for(&backoff);
    let producer = waiter_for(&backoff);
    let latest = Arc::new(AtomicU64::new(NO_EPOCH_PUBLISHED));

    let handle = {
      let consumer = Arc::clone(&consumer);
      let producer = Arc::clone(&producer);
      let latest = Arc::clone(&latest);
      let backoff = backoff.clone();
      thread::Builder::new()
        .name(format!("epochgraph-apply-{fid}"))
        .spawn(move || apply_loop(store, receiver, consumer, producer, backoff, latest))?
    };
    info!(fid, "log runner started");
    Ok(Self {
      fid,
      sender: Some(sender),
      handle: Some(handle),
      consumer,
      producer,
      backoff,
      latest,
    })
  }

  pub fn fid(&self) -> u64 {
    self.fid
  }

  /// Latest epoch the apply thread has published
  pub fn latest_epoch(&self) -> Option<Epoch> {
    let epoch = self.latest.load(Ordering::Acquire);
    (epoch != NO_EPOCH_PUBLISHED).then_some(epoch)
  }

  /// Queue one log line, backing off while the queue is full
  pub fn submit(&self, line: impl Into<String>) -> Result<()> {
    let sender = self
      .sender
      .as_ref()
      .ok_or_else(|| GraphError::RunnerStopped(format!("partition {} shut down", self.fid)))?;
    let mut line = line.into();
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      match sender.try_send(line) {
        Ok(()) => {
          self.consumer.notify();
          return Ok(());
        }
        Err(TrySendError::Full(back)) => {
          line = back;
          self.consumer.notify();
          self.producer.wait(&mut backoff);
        }
        Err(TrySendError::Disconnected(_)) => {
          return Err(GraphError::RunnerStopped(format!(
            "apply thread of partition {} exited",
            self.fid
          )));
        }
      }
    }
  }

  /// Close the queue, let the apply thread drain it and finalize the epoch
  /// in flight, then hand back the store
  pub fn shutdown(mut self) -> Result<(GraphStore, RunnerStats)> {
    self.sender.take();
    self.consumer.notify();
    let handle = self
      .handle
      .take()
      .ok_or_else(|| GraphError::RunnerStopped(format!("partition {} already joined", self.fid)))?;
    handle
      .join()
      .map_err(|_| GraphError::RunnerStopped(format!("apply thread of partition {} panicked", self.fid)))?
  }
}

impl Drop for LogRunner {
  fn drop(&mut self) {
    self.sender.take();
    self.consumer.notify();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

fn apply_loop(
  mut store: GraphStore,
  receiver: Receiver<String>,
  consumer: Arc<dyn Waiter>,
  producer: Arc<dyn Waiter>,
  config: BackoffConfig,
  latest: Arc<AtomicU64>,
) -> Result<(GraphStore, RunnerStats)> {
  let mut stats = RunnerStats::default();
  let mut backoff = Backoff::new(&config);
  loop {
    match receiver.try_recv() {
      Ok(line) => {
        backoff.reset();
        producer.notify();
        stats.lines += 1;
        let applied = store.apply_line(&line).inspect_err(|e| {
          error!(fid = store.fid(), error = %e, "apply thread stopping");
        })?;
        if applied {
          stats.applied += 1;
        } else {
          stats.skipped += 1;
        }
        if let Some(epoch) = store.last_finalized() {
          latest.store(epoch, Ordering::Release);
        }
      }
      Err(TryRecvError::Empty) => {
        stats.idle_waits += 1;
        consumer.wait(&mut backoff);
      }
      Err(TryRecvError::Disconnected) => break,
    }
  }
  if let Some(metadata) = store.finalize()? {
    latest.store(metadata.epoch, Ordering::Release);
  }
  debug!(fid = store.fid(), lines = stats.lines, "apply loop drained");
  Ok((store, stats))
}

/// One runner per partition of a log that every partition sees in full
#[derive(Debug, Default)]
pub struct RunnerPool {
  runners: Vec<LogRunner>,
}

impl RunnerPool {
  pub fn spawn(stores: Vec<GraphStore>) -> Result<Self> {
    let runners = stores
      .into_iter()
      .map(LogRunner::spawn)
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { runners })
  }

  pub fn len(&self) -> usize {
    self.runners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.runners.is_empty()
  }

  pub fn runner(&self, fid: u64) -> Option<&LogRunner> {
    self.runners.iter().find(|r| r.fid() == fid)
  }

  /// Deliver `line` to every partition
  pub fn broadcast(&self, line: &str) -> Result<()> {
    for runner in &self.runners {
      runner.submit(line)?;
    }
    Ok(())
  }

  /// Shut every runner down, in partition order
  pub fn shutdown(self) -> Result<Vec<(GraphStore, RunnerStats)>> {
    self.runners.into_iter().map(LogRunner::shutdown).collect()
  }
}
