// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recurring sync passes.
//!
//! The [`Scheduler`] owns a background task that calls
//! [`Reconciler::run_sync_pass`] every interval. The pass runs inside the
//! loop, so a tick that comes due while a pass is still running is skipped,
//! never queued.
//!
//! State is published on a watch channel:
//!
//! ```text
//!   Idle ──tick──► Running ──done──► Idle
//!    │ ▲
//!  pause resume            stop (from any state) ──► Stopped
//!    ▼ │
//!   Paused
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SyncQueueConfig;
use crate::reconciler::{PassOutcome, Reconciler};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick (or never started)
    Idle,
    /// A pass is in flight
    Running,
    /// Ticks are ignored until [`Scheduler::resume`]
    Paused,
    /// The loop has been told to exit
    Stopped,
}

impl SchedulerState {
    fn gauge(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Stopped => 3,
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// A running loop and its own stop signal.
///
/// The shared state can go back to `Idle` when the scheduler is restarted,
/// so each loop watches a signal nobody else resets.
struct LoopHandle {
    task: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    state: Arc<watch::Sender<SchedulerState>>,
    state_rx: watch::Receiver<SchedulerState>,
    config_rx: watch::Receiver<SyncQueueConfig>,
    handle: Mutex<Option<LoopHandle>>,
}

fn set_state(tx: &watch::Sender<SchedulerState>, next: SchedulerState) {
    tx.send_replace(next);
    crate::metrics::set_scheduler_state(next.gauge());
}

/// Move `from` to `to` only if the current state is still `from`.
fn transition(tx: &watch::Sender<SchedulerState>, from: SchedulerState, to: SchedulerState) -> bool {
    let changed = tx.send_if_modified(|state| {
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    });
    if changed {
        crate::metrics::set_scheduler_state(to.gauge());
    }
    changed
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, config_rx: watch::Receiver<SyncQueueConfig>) -> Self {
        let (state, state_rx) = watch::channel(SchedulerState::Idle);
        Self {
            reconciler,
            state: Arc::new(state),
            state_rx,
            config_rx,
            handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SchedulerState> {
        self.state_rx.clone()
    }

    /// Whether the background loop is alive.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Begin running a pass every `interval`, the first one a full interval
    /// from now. Returns `false` if the loop is already running.
    ///
    /// Must be called from within a Tokio runtime.
    #[tracing::instrument(skip(self))]
    pub fn start(&self, interval: Duration) -> bool {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.task.is_finished()) {
            debug!("Scheduler already started");
            return false;
        }

        if self.state() != SchedulerState::Paused {
            set_state(&self.state, SchedulerState::Idle);
        }
        let interval = interval.max(Duration::from_millis(1));
        info!(interval_ms = interval.as_millis() as u64, "Starting sync scheduler");

        let reconciler = Arc::clone(&self.reconciler);
        let state = Arc::clone(&self.state);
        let config_rx = self.config_rx.clone();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(reconciler, state, config_rx, stop_rx, interval));
        *handle = Some(LoopHandle { task, stop });
        true
    }

    /// Stop scheduling passes. A pass already in flight runs to completion
    /// and its results are still applied.
    #[tracing::instrument(skip(self))]
    pub fn stop(&self) {
        set_state(&self.state, SchedulerState::Stopped);
        // Detach; the loop exits after any pass it is running.
        if let Some(handle) = self.handle.lock().take() {
            handle.stop.send_replace(true);
        }
        info!("Sync scheduler stopped");
    }

    /// Ignore ticks until [`resume`](Self::resume). No-op once stopped.
    /// Returns whether this call did the pausing.
    pub fn pause(&self) -> bool {
        let paused = self
            .state
            .send_if_modified(|state| match state {
                SchedulerState::Stopped | SchedulerState::Paused => false,
                _ => {
                    *state = SchedulerState::Paused;
                    true
                }
            });
        if paused {
            crate::metrics::set_scheduler_state(SchedulerState::Paused.gauge());
            debug!("Sync scheduler paused");
        }
        paused
    }

    /// Leave the paused state. The next scheduled pass is a full interval
    /// from now.
    pub fn resume(&self) {
        if transition(&self.state, SchedulerState::Paused, SchedulerState::Idle) {
            debug!("Sync scheduler resumed");
        }
    }

    /// Run one pass now, regardless of the schedule.
    pub async fn run_once(&self) -> PassOutcome {
        let marked = transition(&self.state, SchedulerState::Idle, SchedulerState::Running);
        let outcome = self.reconciler.run_sync_pass().await;
        if marked {
            transition(&self.state, SchedulerState::Running, SchedulerState::Idle);
        }
        outcome
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.stop.send_replace(true);
            handle.task.abort();
        }
    }
}

async fn run_loop(
    reconciler: Arc<Reconciler>,
    state: Arc<watch::Sender<SchedulerState>>,
    mut config_rx: watch::Receiver<SyncQueueConfig>,
    mut stop_rx: watch::Receiver<bool>,
    mut period: Duration,
) {
    let mut state_rx = state.subscribe();
    let mut ticker = ticker(period);
    if *stop_rx.borrow() {
        return;
    }
    let mut was_paused = match *state_rx.borrow() {
        SchedulerState::Stopped => return,
        current => current == SchedulerState::Paused,
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *stop_rx.borrow() || *state.borrow() == SchedulerState::Stopped {
                    break;
                }
                if !transition(&state, SchedulerState::Idle, SchedulerState::Running) {
                    debug!(state = %*state.borrow(), "Tick ignored");
                    continue;
                }
                let outcome = reconciler.run_sync_pass().await;
                debug!(outcome = %outcome, "Scheduled pass finished");
                if *stop_rx.borrow() {
                    break;
                }
                transition(&state, SchedulerState::Running, SchedulerState::Idle);
                // Ticks that came due during the pass are dropped.
                ticker.reset();
            }

            _ = stop_rx.changed() => break,

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state_rx.borrow_and_update();
                match current {
                    SchedulerState::Stopped => break,
                    SchedulerState::Paused => was_paused = true,
                    _ if was_paused => {
                        was_paused = false;
                        ticker.reset();
                    }
                    _ => {}
                }
            }

            Ok(()) = config_rx.changed() => {
                let config = config_rx.borrow_and_update().clone();
                let next = config.sync_interval();
                reconciler.update_config(config);
                if next != period {
                    info!(interval_ms = next.as_millis() as u64, "Sync interval updated");
                    period = next;
                    ticker = self::ticker(period);
                }
            }
        }
    }

    debug!("Scheduler loop exited");
}
