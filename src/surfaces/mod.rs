//! Selection surfaces
//!
//! The map and the dropdown are the two concurrent writers. Neither talks to
//! the other: each proposes envelopes to the shared [`SelectionStore`] and
//! follows the store's events to stay in step.
//!
//! Every write goes through the same steps:
//!
//! 1. Confirmed → inert, no envelope is built
//! 2. Other surface holds an active lock → rejected locally, no envelope
//! 3. Local view updated optimistically, envelope proposed
//! 4. Rejected → local view rolled back; accepted → local view set to the
//!    store's selection
//!
//! A surface ignores the echo of its own accepted write while the store
//! still flags it busy (T1).

pub mod dropdown;
pub mod map;

pub use dropdown::{DropdownOption, DropdownSurface, OptionGroup};
pub use map::{FeatureRenderer, MapSurface, NoopRenderer};

use crate::protocol::ProposalOutcome;
use crate::store::SelectionStore;
use basin_types::{CandidateUniverse, ChangeEnvelope, LocationId, Source};
use std::collections::BTreeSet;

/// Result of a write attempted through a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOutcome {
    /// Envelope accepted; local view matches the store
    Accepted,
    /// Blocked or refused; local view rolled back
    Rejected(ProposalOutcome),
    /// Selection is confirmed; nothing was proposed
    Inert,
    /// Nothing to propose (e.g. the village is not in the current universe)
    Ignored,
}

impl SurfaceOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, SurfaceOutcome::Accepted)
    }
}

/// Common read side of both surfaces.
pub trait Surface {
    fn source(&self) -> Source;

    /// What this surface currently shows as selected.
    fn selected(&self) -> BTreeSet<LocationId>;

    /// Whether the surface shows the "locked" state.
    fn is_locked(&self) -> bool;

    /// Adopt the store's selection unconditionally.
    fn resync(&self);
}

/// Steps 1 and 2 of the write path. `None` means go ahead.
pub(crate) fn precheck(store: &SelectionStore, source: Source) -> Option<SurfaceOutcome> {
    if store.confirmation().is_confirmed() {
        tracing::debug!(%source, "Write ignored: selection confirmed");
        return Some(SurfaceOutcome::Inert);
    }
    if let Some(window) = store.lock_window() {
        if window.blocks(source, store.now()) {
            tracing::debug!(%source, holder = %window.holder, "Write blocked by lock window");
            return Some(SurfaceOutcome::Rejected(ProposalOutcome::RejectedLocked));
        }
    }
    None
}

/// Build and propose an envelope for `proposed` against `universe`.
pub(crate) fn submit(
    store: &SelectionStore,
    source: Source,
    proposed: BTreeSet<LocationId>,
    universe: &CandidateUniverse,
) -> ProposalOutcome {
    let envelope = ChangeEnvelope::new(source, proposed, store.now(), universe);
    store.propose(&envelope)
}
