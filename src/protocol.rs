//! Reconciliation protocol
//!
//! Arbitrates proposals from the two surfaces using a time-boxed logical
//! lock. There is no mutex involved: the lock is a holder plus an expiry
//! timestamp, and it lapses on its own.
//!
//! ```text
//!            propose(s)                    propose(s)  (refresh)
//!   IDLE ─────────────────► LOCKED(s, now+T2) ◄──────┐
//!    ▲                          │   │                │
//!    │ T2 elapses               │   └────────────────┘
//!    └──────────────────────────┘
//!                               │ propose(other), now <  exp  → rejected-locked
//!                               │ propose(other), now >= exp  → LOCKED(other, now+T2)
//! ```
//!
//! Three durations, strictly increasing:
//!
//! - **T1 (busy)**: a writer is flagged busy after its write so its own
//!   subscriber ignores the echo of that write
//! - **T2 (lock)**: the lock window; covers one propagate-and-settle round
//!   trip across both surfaces
//! - **T3 (stale)**: a stored snapshot older than this is abandoned and no
//!   longer blocks anyone

use crate::config::TimingConfig;
use basin_types::{ChangeEnvelope, SelectionSnapshot, Source, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of [`SelectionStore::propose`](crate::store::SelectionStore::propose).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOutcome {
    Accepted,
    RejectedStale,
    RejectedLocked,
}

impl ProposalOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, ProposalOutcome::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProposalOutcome::Accepted => "accepted",
            ProposalOutcome::RejectedStale => "rejected-stale",
            ProposalOutcome::RejectedLocked => "rejected-locked",
        }
    }
}

/// Protocol state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Idle,
    Locked {
        holder: Source,
        expires_at: Timestamp,
    },
}

/// An exclusive-write grant to one source, until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWindow {
    pub holder: Source,
    pub expires_at: Timestamp,
}

impl LockWindow {
    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Whether this window blocks writes from `source` at `now`.
    pub fn blocks(&self, source: Source, now: Timestamp) -> bool {
        self.holder != source && self.is_active(now)
    }
}

/// How an accepted proposal changed the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTransition {
    /// IDLE → LOCKED
    Acquired,
    /// Same holder extended its window
    Refreshed,
    /// Previous holder's window had lapsed (or its snapshot was abandoned)
    TakenOver { previous: Source },
}

/// Why an envelope was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Proposed before the stored snapshot was written
    OlderThanSnapshot {
        proposed_at: Timestamp,
        stored_at: Timestamp,
    },
    /// Built against a candidate universe that has since been replaced
    SupersededUniverse { envelope: u64, current: u64 },
}

/// Decision for one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept(LockTransition),
    RejectStale(StaleReason),
    RejectLocked(LockWindow),
}

impl Verdict {
    pub fn outcome(&self) -> ProposalOutcome {
        match self {
            Verdict::Accept(_) => ProposalOutcome::Accepted,
            Verdict::RejectStale(_) => ProposalOutcome::RejectedStale,
            Verdict::RejectLocked(_) => ProposalOutcome::RejectedLocked,
        }
    }
}

/// The lock state machine.
#[derive(Debug, Clone)]
pub struct ReconciliationProtocol {
    timing: TimingConfig,
    state: LockState,
}

impl ReconciliationProtocol {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            state: LockState::Idle,
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// The lock window, if one is held and unexpired at `now`.
    pub fn lock_window(&self, now: Timestamp) -> Option<LockWindow> {
        match self.state {
            LockState::Locked { holder, expires_at } if now < expires_at => Some(LockWindow {
                holder,
                expires_at,
            }),
            _ => None,
        }
    }

    /// A snapshot older than T3 is abandoned.
    pub fn is_abandoned(&self, stored_at: Timestamp, now: Timestamp) -> bool {
        now.since(stored_at) >= self.timing.stale()
    }

    /// Judge `envelope` against the stored snapshot and, when accepted, move
    /// the lock to the envelope's source.
    ///
    /// Staleness is checked before the lock: an out-of-order envelope is
    /// rejected whatever the lock state.
    pub fn arbitrate(
        &mut self,
        envelope: &ChangeEnvelope,
        stored: &SelectionSnapshot,
        current_generation: u64,
        now: Timestamp,
    ) -> Verdict {
        if envelope.universe_generation() < current_generation {
            return Verdict::RejectStale(StaleReason::SupersededUniverse {
                envelope: envelope.universe_generation(),
                current: current_generation,
            });
        }
        if envelope.proposed_at() < stored.timestamp {
            return Verdict::RejectStale(StaleReason::OlderThanSnapshot {
                proposed_at: envelope.proposed_at(),
                stored_at: stored.timestamp,
            });
        }

        let source = envelope.source();
        let abandoned = self.is_abandoned(stored.timestamp, now);
        let transition = match self.state {
            LockState::Idle => LockTransition::Acquired,
            LockState::Locked { holder, .. } if holder == source => LockTransition::Refreshed,
            LockState::Locked { holder, expires_at } => {
                if now < expires_at && !abandoned {
                    return Verdict::RejectLocked(LockWindow { holder, expires_at });
                }
                LockTransition::TakenOver { previous: holder }
            }
        };

        self.state = LockState::Locked {
            holder: source,
            expires_at: now.plus(self.timing.lock()),
        };
        Verdict::Accept(transition)
    }

    /// Timeout transition: back to IDLE once the window has lapsed.
    /// Returns `true` if the state changed.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        match self.state {
            LockState::Locked { expires_at, .. } if now >= expires_at => {
                self.state = LockState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = LockState::Idle;
    }
}

// =============================================================================
// WRITER-BUSY CELL
// =============================================================================

const TAG_BITS: u32 = 2;
const TAG_MASK: u64 = 0b11;
const TAG_NONE: u64 = 0;
const TAG_MAP: u64 = 1;
const TAG_DROPDOWN: u64 = 2;

/// Atomic "writer busy" flag with a synchronous read.
///
/// Holder and deadline are packed into one word so a reader never sees a
/// holder from one write paired with the deadline of another.
#[derive(Debug, Default)]
pub struct BusyCell {
    word: AtomicU64,
}

impl BusyCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert_busy(&self, source: Source, until: Timestamp) {
        self.word.store(pack(Some(source), until), Ordering::SeqCst);
    }

    /// Writer currently flagged busy at `now`, if any.
    pub fn holder(&self, now: Timestamp) -> Option<Source> {
        let (source, until) = unpack(self.word.load(Ordering::SeqCst));
        source.filter(|_| now < until)
    }

    pub fn is_busy(&self, source: Source, now: Timestamp) -> bool {
        self.holder(now) == Some(source)
    }

    /// Clear the flag if it still belongs to `source` and has lapsed at `now`.
    /// A newer assertion made in between is left alone.
    pub fn release_if_lapsed(&self, source: Source, now: Timestamp) -> bool {
        let current = self.word.load(Ordering::SeqCst);
        let (holder, until) = unpack(current);
        if holder != Some(source) || now < until {
            return false;
        }
        self.word
            .compare_exchange(current, TAG_NONE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn clear(&self) {
        self.word.store(TAG_NONE, Ordering::SeqCst);
    }
}

fn pack(source: Option<Source>, until: Timestamp) -> u64 {
    let tag = match source {
        None => TAG_NONE,
        Some(Source::Map) => TAG_MAP,
        Some(Source::Dropdown) => TAG_DROPDOWN,
    };
    (until.as_millis() << TAG_BITS) | tag
}

fn unpack(word: u64) -> (Option<Source>, Timestamp) {
    let source = match word & TAG_MASK {
        TAG_MAP => Some(Source::Map),
        TAG_DROPDOWN => Some(Source::Dropdown),
        _ => None,
    };
    (source, Timestamp::from_millis(word >> TAG_BITS))
}
