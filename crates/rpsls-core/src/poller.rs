//! Fixed-interval ledger sampling, one cancellable loop per match.

use crate::error::GameError;
use rpsls_ledger::ledger::Address;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a sample decided about the monitored match
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStatus {
    Continue,
    /// The match reached a terminal phase
    Finished,
}

#[derive(Debug)]
struct ActiveMonitor {
    generation: u64,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

type MonitorMap = Arc<Mutex<HashMap<Address, ActiveMonitor>>>;

/// Handle on a running monitor loop
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    match_id: Address,
    cancel: Arc<watch::Sender<bool>>,
    done: watch::Receiver<bool>,
}

impl MonitorHandle {
    pub fn match_id(&self) -> Address {
        self.match_id
    }

    /// Ask the loop to stop after the sample in progress
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// The loop exited, or was aborted by a restart
    pub fn is_finished(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }

    /// Wait until the loop exits
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Owns every monitor loop of a client.
///
/// Starting a monitor for a match that already has one aborts the old loop
/// first, so at most one loop per match is ever alive.
#[derive(Default)]
pub struct StatePoller {
    monitors: MonitorMap,
    next_generation: AtomicU64,
}

impl StatePoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a loop calling `sample` every `interval` until it reports
    /// [`PollStatus::Finished`] or the monitor is cancelled.
    ///
    /// Failed samples are logged and retried. After `n` consecutive failures
    /// the loop sits out `min(2^(n-1), backoff_cap) - 1` ticks.
    pub fn start<F, Fut>(
        &self,
        match_id: Address,
        interval: Duration,
        backoff_cap: u32,
        sample: F,
    ) -> MonitorHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<PollStatus, GameError>> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);
        let (done_tx, done_rx) = watch::channel(false);

        let mut monitors = self.monitors.lock().unwrap();
        if let Some(previous) = monitors.remove(&match_id) {
            previous.cancel.send_replace(true);
            previous.task.abort();
            debug!(%match_id, generation = previous.generation, "replaced monitor");
        }

        let task = tokio::spawn(run_monitor(
            MonitorLoop {
                match_id,
                generation,
                interval,
                backoff_cap: backoff_cap.max(1),
                monitors: Arc::clone(&self.monitors),
            },
            sample,
            cancel_rx,
            done_tx,
        ));
        monitors.insert(
            match_id,
            ActiveMonitor {
                generation,
                cancel: Arc::clone(&cancel),
                task,
            },
        );
        info!(%match_id, ?interval, "monitoring started");

        MonitorHandle {
            match_id,
            cancel,
            done: done_rx,
        }
    }

    /// Stop a match's loop now, dropping its timer. Returns whether one was running.
    pub fn stop(&self, match_id: &Address) -> bool {
        match self.monitors.lock().unwrap().remove(match_id) {
            Some(monitor) => {
                monitor.cancel.send_replace(true);
                monitor.task.abort();
                info!(%match_id, "monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let mut monitors = self.monitors.lock().unwrap();
        for (match_id, monitor) in monitors.drain() {
            monitor.cancel.send_replace(true);
            monitor.task.abort();
            debug!(%match_id, "monitoring stopped");
        }
    }

    pub fn is_monitoring(&self, match_id: &Address) -> bool {
        self.monitors.lock().unwrap().contains_key(match_id)
    }

    pub fn active_count(&self) -> usize {
        self.monitors.lock().unwrap().len()
    }
}

impl Drop for StatePoller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct MonitorLoop {
    match_id: Address,
    generation: u64,
    interval: Duration,
    backoff_cap: u32,
    monitors: MonitorMap,
}

async fn run_monitor<F, Fut>(
    config: MonitorLoop,
    mut sample: F,
    mut cancel: watch::Receiver<bool>,
    done: watch::Sender<bool>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus, GameError>>,
{
    let match_id = config.match_id;
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failures: u32 = 0;
    let mut skip: u32 = 0;

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    debug!(%match_id, "monitor cancelled");
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if skip > 0 {
            skip -= 1;
            continue;
        }

        match sample().await {
            Ok(PollStatus::Continue) => failures = 0,
            Ok(PollStatus::Finished) => {
                info!(%match_id, "match finished, monitoring ends");
                break;
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                skip = backoff_ticks(failures, config.backoff_cap);
                warn!(%match_id, failures, skip, error = %e, "state sample failed");
            }
        }
    }

    {
        let mut monitors = config.monitors.lock().unwrap();
        if monitors.get(&match_id).map(|m| m.generation) == Some(config.generation) {
            monitors.remove(&match_id);
        }
    }
    done.send_replace(true);
}

/// Ticks to sit out after `failures` consecutive failed samples
fn backoff_ticks(failures: u32, cap: u32) -> u32 {
    let exponential = 1u32
        .checked_shl(failures.saturating_sub(1))
        .unwrap_or(u32::MAX);
    exponential.min(cap.max(1)) - 1
}
