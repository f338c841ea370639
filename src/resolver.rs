//! Hierarchical resolver
//!
//! Cascading dependent selection: river → stretch → drain → catchment, with
//! the village list as the terminal candidate universe.
//!
//! ## Rules
//!
//! 1. Selecting at level L clears every level below L *before* the next
//!    fetch is awaited, and empties the store's selection in the same step.
//! 2. Re-selecting the current id is a no-op (no reset, no fetch).
//! 3. Every fetch is tagged with a request number on the level it fills. A
//!    response is applied only if that level still carries the same number
//!    and the parent is still selected; anything else is discarded.
//! 4. A failed fetch leaves the level empty with an error string. Nothing
//!    propagates past the resolver.
//! 5. While the store is confirmed every selecting call is inert.
//! 6. Reloading the river list drops a selected river that is no longer
//!    listed, together with everything below it.
//!
//! Selecting a drain fetches both its catchments and its villages. Selecting
//! a catchment narrows the drain's villages locally without a refetch.
//!
//! Store listeners must not call back into the resolver: the resolver
//! publishes universes to the store while holding its own lock, so the
//! published universe always matches the resolver state.

use crate::catalog::LocationCatalog;
use crate::error::{CatalogError, ResolverError};
use crate::store::SelectionStore;
use basin_types::{CandidateUniverse, Level, LocationId, LocationNode, Village};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of a selecting call on the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Selection recorded and the dependent levels loaded
    Applied,
    /// Same id already selected; nothing happened
    Unchanged,
    /// Selection is confirmed; call ignored
    Frozen,
    /// A newer selection replaced this one before its fetch resolved
    Superseded,
    /// Selection recorded, but a dependent fetch failed
    FetchFailed(String),
}

/// Read-only view of one level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelView {
    pub candidates: Vec<LocationNode>,
    pub selected: Option<LocationId>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct LevelSlot {
    view: LevelView,
    request: u64,
}

#[derive(Debug, Default)]
struct ResolverInner {
    slots: [LevelSlot; 5],
    /// Every village of the selected drain, before catchment narrowing
    drain_villages: Vec<Village>,
    next_request: u64,
}

impl ResolverInner {
    fn slot(&mut self, level: Level) -> &mut LevelSlot {
        &mut self.slots[level.index()]
    }

    fn view(&self, level: Level) -> &LevelView {
        &self.slots[level.index()].view
    }

    fn issue_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// Empty every level below `level`. In-flight responses for those levels
    /// are orphaned by giving each a fresh request number.
    fn clear_downstream(&mut self, level: Level) {
        for below in level.downstream() {
            let request = self.issue_request();
            *self.slot(below) = LevelSlot {
                view: LevelView::default(),
                request,
            };
        }
        if level < Level::Catchment {
            self.drain_villages.clear();
        }
    }

    /// Mark `level` as loading and return the request number to apply with.
    fn begin_fetch(&mut self, level: Level) -> u64 {
        let request = self.issue_request();
        let slot = self.slot(level);
        slot.request = request;
        slot.view.loading = true;
        slot.view.error = None;
        request
    }

    /// Whether a response for `level` tagged `request` may still be applied.
    fn is_current(&self, level: Level, request: u64, parent: Option<(Level, &LocationId)>) -> bool {
        if self.slots[level.index()].request != request {
            return false;
        }
        match parent {
            Some((parent_level, id)) => self.view(parent_level).selected.as_ref() == Some(id),
            None => true,
        }
    }
}

pub struct HierarchicalResolver {
    catalog: Arc<dyn LocationCatalog>,
    store: Arc<SelectionStore>,
    inner: Mutex<ResolverInner>,
}

impl HierarchicalResolver {
    pub fn new(catalog: Arc<dyn LocationCatalog>, store: Arc<SelectionStore>) -> Self {
        Self {
            catalog,
            store,
            inner: Mutex::new(ResolverInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_frozen(&self) -> bool {
        self.store.confirmation().is_confirmed()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn level(&self, level: Level) -> LevelView {
        self.inner().view(level).clone()
    }

    pub fn selected(&self, level: Level) -> Option<LocationId> {
        self.inner().view(level).selected.clone()
    }

    pub fn candidates(&self, level: Level) -> Vec<LocationNode> {
        self.inner().view(level).candidates.clone()
    }

    pub fn error(&self, level: Level) -> Option<String> {
        self.inner().view(level).error.clone()
    }

    /// Selected id at every level that has one, root first.
    pub fn path(&self) -> Vec<(Level, LocationId)> {
        let inner = self.inner();
        Level::ALL
            .into_iter()
            .filter_map(|level| inner.view(level).selected.clone().map(|id| (level, id)))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Fetch the river list.
    pub async fn load_rivers(&self) -> SelectOutcome {
        if self.is_frozen() {
            return SelectOutcome::Frozen;
        }
        let request = self.inner().begin_fetch(Level::River);

        let result = self.catalog.children(Level::River, None).await;

        let mut inner = self.inner();
        if !inner.is_current(Level::River, request, None) {
            tracing::debug!("Discarding superseded river list");
            return SelectOutcome::Superseded;
        }
        let outcome = apply_nodes(inner.slot(Level::River), Level::River, result);

        let river = inner.view(Level::River);
        let vanished = match &river.selected {
            Some(id) => {
                outcome == SelectOutcome::Applied
                    && !river.candidates.iter().any(|n| n.id() == id)
            }
            None => false,
        };
        if vanished {
            tracing::info!("Selected river missing from reloaded list, clearing path");
            inner.slot(Level::River).view.selected = None;
            inner.clear_downstream(Level::River);
            self.store.replace_universe(CandidateUniverse::empty());
        }
        outcome
    }

    /// Select `id` at `level` and load what depends on it.
    pub async fn select_level(
        &self,
        level: Level,
        id: LocationId,
    ) -> Result<SelectOutcome, ResolverError> {
        if level == Level::Village {
            return Err(ResolverError::NotSelectable(level));
        }
        if self.is_frozen() {
            tracing::debug!(%level, %id, "Ignoring selection while confirmed");
            return Ok(SelectOutcome::Frozen);
        }

        let requests = {
            let mut inner = self.inner();
            if let Some(parent) = level.parent() {
                if inner.view(parent).selected.is_none() {
                    return Err(ResolverError::ParentNotSelected(parent));
                }
            }
            let slot = inner.slot(level);
            if slot.view.selected.as_ref() == Some(&id) {
                return Ok(SelectOutcome::Unchanged);
            }
            if !slot.view.candidates.iter().any(|n| n.id() == &id) {
                return Err(ResolverError::UnknownCandidate { level, id });
            }
            slot.view.selected = Some(id.clone());
            inner.clear_downstream(level);
            tracing::info!(%level, %id, "Level selected");

            if level == Level::Catchment {
                let villages: Vec<Village> = inner
                    .drain_villages
                    .iter()
                    .filter(|v| v.catchment_id.as_ref() == Some(&id))
                    .cloned()
                    .collect();
                self.publish_villages(&mut inner, Some(id), villages);
                return Ok(SelectOutcome::Applied);
            }

            self.store.replace_universe(CandidateUniverse::empty());
            let mut requests = Vec::with_capacity(2);
            for target in fetch_targets(level) {
                requests.push((target, inner.begin_fetch(target)));
            }
            requests
        };

        let outcomes = match requests.as_slice() {
            [(child, request)] => {
                let result = self.catalog.children(*child, Some(&id)).await;
                vec![self.apply_child(level, &id, *child, *request, result)]
            }
            [(catchments, c_req), (villages, v_req)] => {
                let (c_result, v_result) = tokio::join!(
                    self.catalog.children(*catchments, Some(&id)),
                    self.catalog.children(*villages, Some(&id)),
                );
                vec![
                    self.apply_child(level, &id, *catchments, *c_req, c_result),
                    self.apply_child(level, &id, *villages, *v_req, v_result),
                ]
            }
            _ => vec![SelectOutcome::Applied],
        };

        Ok(merge_outcomes(outcomes))
    }

    /// Deselect `level`, clearing it and everything below it. Clearing the
    /// catchment brings back the whole drain's villages.
    pub fn clear_level(&self, level: Level) -> SelectOutcome {
        if self.is_frozen() {
            return SelectOutcome::Frozen;
        }
        let mut inner = self.inner();
        if inner.view(level).selected.is_none() {
            return SelectOutcome::Unchanged;
        }

        inner.slot(level).view.selected = None;
        inner.clear_downstream(level);
        tracing::info!(%level, "Level cleared");

        if level == Level::Catchment {
            let villages = inner.drain_villages.clone();
            let drain = inner.view(Level::Drain).selected.clone();
            self.publish_villages(&mut inner, drain, villages);
        } else {
            self.store.replace_universe(CandidateUniverse::empty());
        }
        SelectOutcome::Applied
    }

    /// Clear every level back to empty, including the river list. Pending
    /// fetches are orphaned.
    pub fn reset(&self) {
        let mut inner = self.inner();
        let next_request = inner.next_request;
        *inner = ResolverInner {
            next_request,
            ..Default::default()
        };
        for level in Level::ALL {
            let request = inner.issue_request();
            inner.slot(level).request = request;
        }
        tracing::info!("Resolver reset");
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn apply_child(
        &self,
        parent_level: Level,
        parent: &LocationId,
        child: Level,
        request: u64,
        result: Result<Vec<LocationNode>, CatalogError>,
    ) -> SelectOutcome {
        let mut inner = self.inner();
        if !inner.is_current(child, request, Some((parent_level, parent))) {
            tracing::debug!(%child, %parent, "Discarding superseded response");
            return SelectOutcome::Superseded;
        }

        if child != Level::Village {
            return apply_nodes(inner.slot(child), child, result);
        }

        match result {
            Ok(nodes) => {
                let villages: Vec<Village> =
                    nodes.into_iter().filter_map(LocationNode::into_village).collect();
                inner.drain_villages = villages.clone();
                self.publish_villages(&mut inner, Some(parent.clone()), villages);
                SelectOutcome::Applied
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(level = %child, %parent, error = %message, "Catalog fetch failed");
                let slot = inner.slot(child);
                slot.view.loading = false;
                slot.view.error = Some(message.clone());
                SelectOutcome::FetchFailed(message)
            }
        }
    }

    /// Fill the village level and hand the new universe to the store.
    fn publish_villages(
        &self,
        inner: &mut ResolverInner,
        parent: Option<LocationId>,
        villages: Vec<Village>,
    ) {
        let slot = inner.slot(Level::Village);
        slot.view.candidates = villages.iter().cloned().map(LocationNode::Village).collect();
        slot.view.loading = false;
        slot.view.error = None;
        self.store
            .replace_universe(CandidateUniverse::new(parent, villages));
    }
}

/// Levels fetched after selecting at `level`.
fn fetch_targets(level: Level) -> Vec<Level> {
    match level {
        Level::River => vec![Level::Stretch],
        Level::Stretch => vec![Level::Drain],
        Level::Drain => vec![Level::Catchment, Level::Village],
        Level::Catchment | Level::Village => Vec::new(),
    }
}

fn apply_nodes(
    slot: &mut LevelSlot,
    level: Level,
    result: Result<Vec<LocationNode>, CatalogError>,
) -> SelectOutcome {
    slot.view.loading = false;
    match result {
        Ok(nodes) => {
            let total = nodes.len();
            slot.view.candidates = nodes.into_iter().filter(|n| n.level() == level).collect();
            if slot.view.candidates.len() != total {
                tracing::warn!(%level, dropped = total - slot.view.candidates.len(), "Dropped records of the wrong level");
            }
            slot.view.error = None;
            SelectOutcome::Applied
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(%level, error = %message, "Catalog fetch failed");
            slot.view.candidates.clear();
            slot.view.error = Some(message.clone());
            SelectOutcome::FetchFailed(message)
        }
    }
}

/// Superseded wins over failure, failure over success.
fn merge_outcomes(outcomes: Vec<SelectOutcome>) -> SelectOutcome {
    if outcomes.contains(&SelectOutcome::Superseded) {
        return SelectOutcome::Superseded;
    }
    outcomes
        .into_iter()
        .find(|o| matches!(o, SelectOutcome::FetchFailed(_)))
        .unwrap_or(SelectOutcome::Applied)
}
