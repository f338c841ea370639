//! Selection types shared by both surfaces and the store

use crate::location::{LocationId, Village};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Which surface produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Map,
    Dropdown,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Map => "map",
            Source::Dropdown => "dropdown",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic timestamp in milliseconds since an arbitrary origin.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn plus(self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(d.as_millis() as u64))
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ============================================================================
// CANDIDATE UNIVERSE
// ============================================================================

/// The villages selectable under the current hierarchy position.
///
/// `generation` increases every time the universe is replaced; anything built
/// against an older generation is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUniverse {
    pub generation: u64,
    /// Drain or catchment the villages were resolved under
    pub parent: Option<LocationId>,
    pub villages: Vec<Village>,
}

impl CandidateUniverse {
    pub fn new(parent: Option<LocationId>, villages: Vec<Village>) -> Self {
        Self {
            generation: 0,
            parent,
            villages,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn contains(&self, id: &LocationId) -> bool {
        self.villages.iter().any(|v| &v.id == id)
    }

    pub fn ids(&self) -> BTreeSet<LocationId> {
        self.villages.iter().map(|v| v.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.villages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.villages.is_empty()
    }

    /// Every village in universe order with its selected flag.
    pub fn mark(&self, selected: &BTreeSet<LocationId>) -> Vec<VillageSelection> {
        self.villages
            .iter()
            .map(|v| VillageSelection {
                village: v.clone(),
                selected: selected.contains(&v.id),
            })
            .collect()
    }
}

/// A village paired with its selected flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillageSelection {
    pub village: Village,
    pub selected: bool,
}

// ============================================================================
// CHANGE ENVELOPE
// ============================================================================

/// An immutable, timestamped proposal from one surface to replace the
/// selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    id: Uuid,
    source: Source,
    proposed_ids: BTreeSet<LocationId>,
    proposed_at: Timestamp,
    universe_generation: u64,
    full_snapshot: Vec<VillageSelection>,
}

impl ChangeEnvelope {
    /// Build an envelope against `universe`. The full snapshot lists every
    /// village of the universe with its flag recomputed from `proposed_ids`.
    pub fn new(
        source: Source,
        proposed_ids: BTreeSet<LocationId>,
        proposed_at: Timestamp,
        universe: &CandidateUniverse,
    ) -> Self {
        let full_snapshot = universe.mark(&proposed_ids);
        Self {
            id: Uuid::new_v4(),
            source,
            proposed_ids,
            proposed_at,
            universe_generation: universe.generation,
            full_snapshot,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn proposed_ids(&self) -> &BTreeSet<LocationId> {
        &self.proposed_ids
    }

    pub fn proposed_at(&self) -> Timestamp {
        self.proposed_at
    }

    pub fn universe_generation(&self) -> u64 {
        self.universe_generation
    }

    pub fn full_snapshot(&self) -> &[VillageSelection] {
        &self.full_snapshot
    }
}

// ============================================================================
// CONFIRMATION & SNAPSHOT
// ============================================================================

/// Confirmed is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    #[default]
    Unconfirmed,
    Confirmed,
}

impl ConfirmationState {
    pub fn is_confirmed(self) -> bool {
        matches!(self, ConfirmationState::Confirmed)
    }
}

/// Read-only view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub selection: BTreeSet<LocationId>,
    /// Surface that wrote the selection; `None` after a reset or a universe
    /// replacement
    pub source: Option<Source>,
    pub timestamp: Timestamp,
    pub confirmation: ConfirmationState,
    pub universe_generation: u64,
}
