//! Selection store
//!
//! The single shared mutable resource. Holds the selected village ids with
//! their provenance, the current candidate universe, the confirmation flag
//! and the lock state. Both surfaces get the same `Arc<SelectionStore>`;
//! nothing else is shared between them.
//!
//! Writes go through [`SelectionStore::propose`]. Surfaces are expected to
//! consult [`SelectionStore::lock_window`] before building an envelope, but
//! the store makes the authoritative decision either way. A third writer
//! that skips the surfaces still goes through `propose`, so it cannot
//! corrupt state, but it can hold the lock against both surfaces.
//!
//! Listeners are invoked after the internal lock is released, so they may
//! read the store (or even propose) from inside the callback.

use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::error::ConfirmError;
use crate::protocol::{
    BusyCell, LockState, LockTransition, LockWindow, ProposalOutcome, ReconciliationProtocol,
    Verdict,
};
use crate::scheduler::{Scheduler, TimerHandle};
use basin_types::{
    CandidateUniverse, ChangeEnvelope, ConfirmationState, LocationId, SelectionSnapshot, Source,
    Timestamp, Village, VillageSelection,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

// =============================================================================
// EVENTS
// =============================================================================

/// An accepted write, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub source: Source,
    pub proposed_at: Timestamp,
    pub selection: BTreeSet<LocationId>,
    /// Every village of the current universe with its selected flag
    pub villages: Vec<VillageSelection>,
}

/// Notification delivered to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// An envelope was accepted
    SelectionChanged(SelectionChange),
    /// The candidate universe was replaced and the selection emptied
    UniverseReplaced { generation: u64, village_count: usize },
    Confirmed,
    Reset,
}

pub type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Timers the store schedules on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTimer {
    /// T1 after a write: the writer's busy flag lapses
    BusyLapsed(Source),
    /// T2 after the last accepted write: lock returns to IDLE
    LockExpired,
    /// T3 after the stored snapshot was written
    SnapshotAbandoned { stored_at: Timestamp },
}

// =============================================================================
// STORE
// =============================================================================

struct StoreInner {
    snapshot: SelectionSnapshot,
    universe: Arc<CandidateUniverse>,
    protocol: ReconciliationProtocol,
    timers: Scheduler<StoreTimer>,
    lock_timer: Option<TimerHandle>,
    stale_timer: Option<TimerHandle>,
    /// Envelopes accepted against the current universe generation
    applied: HashSet<Uuid>,
    next_generation: u64,
}

impl StoreInner {
    fn cancel_timer(&mut self, handle: Option<TimerHandle>) {
        if let Some(handle) = handle {
            self.timers.cancel(handle);
        }
    }

    fn selected_villages(&self) -> Vec<Village> {
        self.universe
            .villages
            .iter()
            .filter(|v| self.snapshot.selection.contains(&v.id))
            .cloned()
            .collect()
    }
}

pub struct SelectionStore {
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
    busy: BusyCell,
    inner: Mutex<StoreInner>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("timing", &self.timing)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SelectionStore {
    pub fn new(timing: TimingConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            clock,
            timing,
            busy: BusyCell::new(),
            inner: Mutex::new(StoreInner {
                snapshot: SelectionSnapshot {
                    timestamp: now,
                    ..Default::default()
                },
                universe: Arc::new(CandidateUniverse::empty()),
                protocol: ReconciliationProtocol::new(timing),
                timers: Scheduler::new(),
                lock_timer: None,
                stale_timer: None,
                applied: HashSet::new(),
                next_generation: 1,
            }),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    // -------------------------------------------------------------------------
    // Reads (never block on a write in progress)
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.inner().snapshot.clone()
    }

    pub fn selection(&self) -> BTreeSet<LocationId> {
        self.inner().snapshot.selection.clone()
    }

    pub fn confirmation(&self) -> ConfirmationState {
        self.inner().snapshot.confirmation
    }

    pub fn universe(&self) -> Arc<CandidateUniverse> {
        Arc::clone(&self.inner().universe)
    }

    /// Every village of the universe with its selected flag.
    pub fn villages(&self) -> Vec<VillageSelection> {
        let inner = self.inner();
        inner.universe.mark(&inner.snapshot.selection)
    }

    /// The active lock window, if any. A holder whose snapshot is older
    /// than T3 blocks nobody, so no window is reported for it.
    pub fn lock_window(&self) -> Option<LockWindow> {
        let now = self.now();
        let inner = self.inner();
        if inner.protocol.is_abandoned(inner.snapshot.timestamp, now) {
            return None;
        }
        inner.protocol.lock_window(now)
    }

    pub fn lock_state(&self) -> LockState {
        self.inner().protocol.state()
    }

    /// Whether `source` wrote within the last T1.
    pub fn is_writer_busy(&self, source: Source) -> bool {
        self.busy.is_busy(source, self.now())
    }

    /// Whether the stored snapshot is older than T3. An abandoned snapshot
    /// blocks nobody and can be read back by either surface as-is.
    pub fn is_abandoned(&self) -> bool {
        let now = self.now();
        let inner = self.inner();
        inner.protocol.is_abandoned(inner.snapshot.timestamp, now)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.inner().timers.next_deadline()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Submit a proposal. Accepted envelopes replace the selection, take or
    /// refresh the lock and notify subscribers; rejected ones change nothing.
    pub fn propose(&self, envelope: &ChangeEnvelope) -> ProposalOutcome {
        let now = self.now();
        let source = envelope.source();
        let mut guard = self.inner();
        let inner = &mut *guard;

        if inner.snapshot.confirmation.is_confirmed() {
            tracing::debug!(%source, "Proposal rejected: selection is confirmed");
            return ProposalOutcome::RejectedLocked;
        }

        if inner.applied.contains(&envelope.id()) {
            tracing::debug!(%source, envelope = %envelope.id(), "Envelope already applied");
            return ProposalOutcome::Accepted;
        }

        let generation = inner.universe.generation;
        let verdict = inner
            .protocol
            .arbitrate(envelope, &inner.snapshot, generation, now);

        let transition = match verdict {
            Verdict::Accept(transition) => transition,
            Verdict::RejectStale(reason) => {
                tracing::debug!(%source, proposed_at = %envelope.proposed_at(), ?reason, "Proposal rejected as stale");
                return ProposalOutcome::RejectedStale;
            }
            Verdict::RejectLocked(window) => {
                tracing::debug!(
                    %source,
                    holder = %window.holder,
                    expires_at = %window.expires_at,
                    "Proposal rejected: lock held by other surface"
                );
                return ProposalOutcome::RejectedLocked;
            }
        };

        let selection: BTreeSet<LocationId> = envelope
            .proposed_ids()
            .iter()
            .filter(|id| inner.universe.contains(id))
            .cloned()
            .collect();
        let dropped = envelope.proposed_ids().len() - selection.len();
        if dropped > 0 {
            tracing::warn!(%source, dropped, "Dropped ids outside the current universe");
        }

        let stored_at = envelope.proposed_at();
        inner.snapshot = SelectionSnapshot {
            selection: selection.clone(),
            source: Some(source),
            timestamp: stored_at,
            confirmation: inner.snapshot.confirmation,
            universe_generation: generation,
        };
        inner.applied.insert(envelope.id());

        let lock_timer = inner.lock_timer.take();
        inner.cancel_timer(lock_timer);
        let stale_timer = inner.stale_timer.take();
        inner.cancel_timer(stale_timer);
        inner.lock_timer = Some(
            inner
                .timers
                .schedule(now.plus(self.timing.lock()), StoreTimer::LockExpired),
        );
        inner.stale_timer = Some(inner.timers.schedule(
            stored_at.plus(self.timing.stale()),
            StoreTimer::SnapshotAbandoned { stored_at },
        ));
        let busy_until = now.plus(self.timing.busy());
        inner
            .timers
            .schedule(busy_until, StoreTimer::BusyLapsed(source));
        self.busy.assert_busy(source, busy_until);

        match transition {
            LockTransition::Acquired => tracing::debug!(%source, "Lock acquired"),
            LockTransition::Refreshed => tracing::debug!(%source, "Lock refreshed"),
            LockTransition::TakenOver { previous } => {
                tracing::debug!(%source, %previous, "Lock taken over after expiry")
            }
        }

        let change = SelectionChange {
            source,
            proposed_at: stored_at,
            villages: inner.universe.mark(&selection),
            selection,
        };
        drop(guard);

        tracing::debug!(%source, selected = change.selection.len(), "Proposal accepted");
        self.notify(&StoreEvent::SelectionChanged(change));
        ProposalOutcome::Accepted
    }

    /// Install a new candidate universe. The selection is emptied and the
    /// lock released; envelopes built against the old universe become stale.
    /// Returns the new generation.
    pub fn replace_universe(&self, universe: CandidateUniverse) -> u64 {
        let now = self.now();
        let mut inner = self.inner();

        let generation = inner.next_generation;
        inner.next_generation += 1;
        let universe = universe.with_generation(generation);
        let village_count = universe.len();

        inner.universe = Arc::new(universe);
        inner.snapshot = SelectionSnapshot {
            selection: BTreeSet::new(),
            source: None,
            timestamp: now,
            confirmation: inner.snapshot.confirmation,
            universe_generation: generation,
        };
        inner.protocol.reset();
        inner.timers.clear();
        inner.lock_timer = None;
        inner.stale_timer = None;
        inner.applied.clear();
        drop(inner);

        self.busy.clear();
        tracing::debug!(generation, village_count, "Candidate universe replaced");
        self.notify(&StoreEvent::UniverseReplaced {
            generation,
            village_count,
        });
        generation
    }

    /// Freeze the selection. Returns the selected villages in universe order.
    pub fn confirm(&self) -> Result<Vec<Village>, ConfirmError> {
        let mut inner = self.inner();
        if inner.snapshot.confirmation.is_confirmed() {
            return Err(ConfirmError::AlreadyConfirmed);
        }
        if inner.snapshot.selection.is_empty() {
            return Err(ConfirmError::EmptySelection);
        }

        inner.snapshot.confirmation = ConfirmationState::Confirmed;
        inner.protocol.reset();
        inner.timers.clear();
        inner.lock_timer = None;
        inner.stale_timer = None;
        let villages = inner.selected_villages();
        drop(inner);

        self.busy.clear();
        tracing::info!(villages = villages.len(), "Selection confirmed");
        self.notify(&StoreEvent::Confirmed);
        Ok(villages)
    }

    /// Back to the initial state: empty universe, empty selection,
    /// unconfirmed, no lock.
    pub fn reset(&self) {
        let now = self.now();
        let mut inner = self.inner();

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.universe = Arc::new(CandidateUniverse::empty().with_generation(generation));
        inner.snapshot = SelectionSnapshot {
            timestamp: now,
            universe_generation: generation,
            ..Default::default()
        };
        inner.protocol.reset();
        inner.timers.clear();
        inner.lock_timer = None;
        inner.stale_timer = None;
        inner.applied.clear();
        drop(inner);

        self.busy.clear();
        tracing::info!("Selection store reset");
        self.notify(&StoreEvent::Reset);
    }

    /// Fire every timer due at the current time. Returns what fired.
    pub fn tick(&self) -> Vec<StoreTimer> {
        let now = self.now();
        let mut inner = self.inner();
        let due = inner.timers.drain_due(now);
        let mut fired = Vec::with_capacity(due.len());

        for (_, timer) in due {
            match timer {
                StoreTimer::BusyLapsed(source) => {
                    self.busy.release_if_lapsed(source, now);
                }
                StoreTimer::LockExpired => {
                    inner.lock_timer = None;
                    if inner.protocol.expire(now) {
                        tracing::debug!("Lock window lapsed, protocol idle");
                    }
                }
                StoreTimer::SnapshotAbandoned { stored_at } => {
                    inner.stale_timer = None;
                    if inner.snapshot.timestamp == stored_at {
                        inner.protocol.reset();
                        tracing::debug!(%stored_at, "Stored snapshot abandoned");
                    }
                }
            }
            fired.push(timer);
        }
        fired
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Register an `onSelectionChange` consumer. Fires once per accepted
    /// envelope with the full village list, never for rejections.
    pub fn on_selection_change(
        &self,
        callback: impl Fn(&[VillageSelection]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(move |event| {
            if let StoreEvent::SelectionChanged(change) = event {
                callback(&change.villages);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify(&self, event: &StoreEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
