//! Deterministic timer queue
//!
//! Replaces chains of one-shot timers with a single queue that the store
//! drains on [`SelectionStore::tick`](crate::store::SelectionStore::tick).
//! Timers are ordered by deadline, then by scheduling order, so two timers
//! due at the same instant always fire in the order they were set.

use crate::clock::MonotonicClock;
use crate::store::SelectionStore;
use basin_types::Timestamp;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Handle returned by [`Scheduler::schedule`], used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Cancelable timers carrying a payload of type `T`.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BTreeMap<(Timestamp, u64), T>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, at: Timestamp, payload: T) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((at, seq), payload);
        TimerHandle(seq)
    }

    /// Cancel a pending timer. Returns the payload if it had not fired.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let key = self.queue.keys().find(|(_, seq)| *seq == handle.0).copied()?;
        self.queue.remove(&key)
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<(Timestamp, T)> {
        let pending = self.queue.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut self.queue, pending);
        due.into_iter().map(|((at, _), payload)| (at, payload)).collect()
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Upper bound on how long the driver sleeps when nothing is scheduled.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Drive a store's timers from the tokio runtime until `shutdown` flips to
/// `true` or its sender is dropped.
///
/// `clock` must be the clock the store was built with.
pub async fn run_timer_driver(
    store: Arc<SelectionStore>,
    clock: MonotonicClock,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Selection timer driver started");
    loop {
        let wake = match store.next_deadline() {
            Some(at) => tokio::time::Instant::from_std(clock.instant_at(at)),
            None => tokio::time::Instant::now() + IDLE_POLL,
        };

        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {
                store.tick();
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Selection timer driver stopped");
}
