// crates/progress-sync/src/scheduler.rs
//! Recurring staleness check
//!
//! On every tick the scheduler raises one `SyncRequired` event for each
//! active or paused record whose last write is at least one interval old.
//! A record keeps being reported on later ticks until something rewrites it.

use crate::error::{ProgressError, ProgressResult};
use crate::events::{EventBus, ProgressEvent};
use crate::store::ProgressStore;
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

thread_local! {
    /// Address of the gate whose tick this thread is dispatching, 0 if none
    static IN_TICK: Cell<usize> = const { Cell::new(0) };
}

fn gate_id(gate: &TickGate) -> usize {
    gate as *const TickGate as usize
}

/// Marks the current thread as dispatching a tick of one gate until dropped
struct TickFlag {
    previous: usize,
}

impl TickFlag {
    fn set(gate: &TickGate) -> Self {
        let previous = IN_TICK.with(|flag| flag.replace(gate_id(gate)));
        TickFlag { previous }
    }
}

impl Drop for TickFlag {
    fn drop(&mut self) {
        IN_TICK.with(|flag| flag.set(self.previous));
    }
}

#[derive(Debug, Default)]
struct TickGate {
    running: AtomicBool,
    in_flight: Mutex<()>,
}

#[derive(Debug, Default)]
struct Running {
    gate: Arc<TickGate>,
    task: Option<JoinHandle<()>>,
}

/// Periodically flags stale progress records
#[derive(Debug)]
pub struct SyncScheduler {
    interval: Duration,
    running: Mutex<Running>,
}

impl SyncScheduler {
    /// Creates a stopped scheduler
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Mutex::new(Running::default()),
        }
    }

    /// Check period and staleness threshold
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true between `start` and `stop`
    pub fn is_running(&self) -> bool {
        let running = self.lock_running();
        running.task.is_some() && running.gate.running.load(Ordering::SeqCst)
    }

    /// Starts the recurring check on the ambient tokio runtime
    ///
    /// Does nothing if already running.
    pub fn start(
        &self,
        store: Arc<Mutex<ProgressStore>>,
        events: Arc<EventBus>,
    ) -> ProgressResult<()> {
        let mut running = self.lock_running();
        if running.task.is_some() {
            return Ok(());
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProgressError::SchedulerUnavailable)?;

        // Each run gets its own gate so a cancelled task can never resume
        let gate = Arc::new(TickGate::default());
        gate.running.store(true, Ordering::SeqCst);

        // tokio intervals reject a zero period
        let interval = self.interval.max(Duration::from_millis(1));
        let task_gate = Arc::clone(&gate);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !run_tick(&task_gate, &store, &events, interval) {
                    break;
                }
            }
        });

        running.gate = gate;
        running.task = Some(task);
        log::info!("Sync scheduler started ({} ms)", interval.as_millis());
        Ok(())
    }

    /// Stops the recurring check
    ///
    /// Once this returns no further `SyncRequired` is raised. Called from
    /// inside one of this scheduler's own `SyncRequired` handlers, the tick
    /// being dispatched stops at the next record. Called from another
    /// scheduler's handler, it still waits for this scheduler's tick.
    /// Does nothing if not running.
    pub fn stop(&self) {
        let (gate, task) = {
            let mut running = self.lock_running();
            let Some(task) = running.task.take() else {
                return;
            };
            running.gate.running.store(false, Ordering::SeqCst);
            (Arc::clone(&running.gate), task)
        };

        task.abort();

        if IN_TICK.with(Cell::get) != gate_id(&gate) {
            // Wait out a tick of this scheduler that is mid-dispatch elsewhere
            drop(gate.in_flight.lock());
        }
        log::info!("Sync scheduler stopped");
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Running> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Builds a `SyncRequired` event for every stale record, ordered by key
    pub fn stale_records(
        store: &ProgressStore,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ProgressEvent> {
        let threshold_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);

        let mut stale: Vec<_> = store
            .iter()
            .filter(|record| record.state.is_syncable())
            .filter(|record| record.since_last_sync(now).num_milliseconds() >= threshold_ms)
            .collect();
        stale.sort_by(|a, b| (&a.video_id, &a.user_id).cmp(&(&b.video_id, &b.user_id)));

        stale
            .into_iter()
            .map(|record| ProgressEvent::SyncRequired {
                video_id: record.video_id.clone(),
                user_id: record.user_id.clone(),
                position: record.position.clone(),
                session: record.session.clone(),
            })
            .collect()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs one check; returns false once the scheduler has been stopped
fn run_tick(
    gate: &TickGate,
    store: &Mutex<ProgressStore>,
    events: &EventBus,
    interval: Duration,
) -> bool {
    let _in_flight = gate
        .in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !gate.running.load(Ordering::SeqCst) {
        return false;
    }

    let pending = match store.lock() {
        Ok(store) => SyncScheduler::stale_records(&store, interval, Utc::now()),
        Err(_) => {
            log::warn!("Progress store lock poisoned, skipping sync check");
            return true;
        }
    };

    if !pending.is_empty() {
        log::debug!("Sync check found {} stale record(s)", pending.len());
    }

    let _flag = TickFlag::set(gate);
    for event in &pending {
        if !gate.running.load(Ordering::SeqCst) {
            return false;
        }
        events.emit(event);
    }
    gate.running.load(Ordering::SeqCst)
}
