//! Dropdown surface adapter
//!
//! Batch writes: explicit multi-pick, select-all, clear and group toggles.
//! Options are grouped by sub-district. Disabled options are shown but
//! never end up in a proposal.

use super::{precheck, submit, Surface, SurfaceOutcome};
use crate::store::{SelectionStore, StoreEvent, SubscriptionId};
use basin_types::{CandidateUniverse, LocationId, Source};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// One entry in the dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropdownOption {
    pub id: LocationId,
    pub label: String,
    pub group: String,
    pub enabled: bool,
    pub selected: bool,
}

/// Options sharing a sub-district, in universe order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionGroup {
    pub label: String,
    pub options: Vec<DropdownOption>,
}

impl OptionGroup {
    fn enabled_ids(&self) -> impl Iterator<Item = &LocationId> {
        self.options.iter().filter(|o| o.enabled).map(|o| &o.id)
    }
}

#[derive(Debug, Default)]
struct DropdownView {
    picked: BTreeSet<LocationId>,
    disabled: BTreeSet<LocationId>,
    locked: bool,
}

fn lock_view(view: &Mutex<DropdownView>) -> MutexGuard<'_, DropdownView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DropdownSurface {
    store: Arc<SelectionStore>,
    view: Arc<Mutex<DropdownView>>,
    subscription: SubscriptionId,
}

impl DropdownSurface {
    pub fn attach(store: Arc<SelectionStore>) -> Self {
        let view = Arc::new(Mutex::new(DropdownView {
            picked: store.selection(),
            disabled: BTreeSet::new(),
            locked: store.confirmation().is_confirmed(),
        }));

        let weak_store = Arc::downgrade(&store);
        let listener_view = Arc::clone(&view);
        let subscription = store.subscribe(move |event| {
            on_store_event(&weak_store, &listener_view, event);
        });

        Self {
            store,
            view,
            subscription,
        }
    }

    /// Mark villages as excluded from selection.
    pub fn set_disabled(&self, ids: impl IntoIterator<Item = LocationId>) {
        lock_view(&self.view).disabled = ids.into_iter().collect();
    }

    pub fn options(&self) -> Vec<DropdownOption> {
        let universe = self.store.universe();
        let view = lock_view(&self.view);
        universe
            .villages
            .iter()
            .map(|v| DropdownOption {
                id: v.id.clone(),
                label: v.name.clone(),
                group: v.sub_district.clone(),
                enabled: !view.disabled.contains(&v.id),
                selected: view.picked.contains(&v.id),
            })
            .collect()
    }

    /// Options grouped by sub-district, groups in first-seen order.
    pub fn groups(&self) -> Vec<OptionGroup> {
        let mut groups: Vec<OptionGroup> = Vec::new();
        for option in self.options() {
            match groups.iter_mut().find(|g| g.label == option.group) {
                Some(group) => group.options.push(option),
                None => groups.push(OptionGroup {
                    label: option.group.clone(),
                    options: vec![option],
                }),
            }
        }
        groups
    }

    /// Replace the selection with `ids`. Ids outside the universe and
    /// disabled ids are left out of the proposal.
    pub fn set_selection(&self, ids: impl IntoIterator<Item = LocationId>) -> SurfaceOutcome {
        if let Some(outcome) = precheck(&self.store, Source::Dropdown) {
            return outcome;
        }
        let universe = self.store.universe();
        let proposed = self.eligible(&universe, ids);
        self.write(proposed, &universe)
    }

    /// Every enabled option.
    pub fn select_all(&self) -> SurfaceOutcome {
        let ids: Vec<LocationId> = self
            .options()
            .into_iter()
            .filter(|o| o.enabled)
            .map(|o| o.id)
            .collect();
        self.set_selection(ids)
    }

    pub fn clear(&self) -> SurfaceOutcome {
        self.set_selection(Vec::new())
    }

    /// Toggle a group: if every enabled member is selected they are all
    /// deselected, otherwise they are all selected. Other groups keep their
    /// state.
    pub fn select_group(&self, label: &str) -> SurfaceOutcome {
        let Some(group) = self.groups().into_iter().find(|g| g.label == label) else {
            tracing::debug!(group = label, "Unknown dropdown group");
            return SurfaceOutcome::Ignored;
        };

        let mut ids = self.store.selection();
        let members: Vec<LocationId> = group.enabled_ids().cloned().collect();
        if members.is_empty() {
            return SurfaceOutcome::Ignored;
        }
        if members.iter().all(|id| ids.contains(id)) {
            for id in &members {
                ids.remove(id);
            }
        } else {
            ids.extend(members);
        }
        self.set_selection(ids)
    }

    fn eligible(
        &self,
        universe: &CandidateUniverse,
        ids: impl IntoIterator<Item = LocationId>,
    ) -> BTreeSet<LocationId> {
        let view = lock_view(&self.view);
        ids.into_iter()
            .filter(|id| universe.contains(id) && !view.disabled.contains(id))
            .collect()
    }

    fn write(&self, proposed: BTreeSet<LocationId>, universe: &CandidateUniverse) -> SurfaceOutcome {
        let previous = {
            let mut view = lock_view(&self.view);
            std::mem::replace(&mut view.picked, proposed.clone())
        };

        let outcome = submit(&self.store, Source::Dropdown, proposed, universe);
        if outcome.is_accepted() {
            lock_view(&self.view).picked = self.store.selection();
            SurfaceOutcome::Accepted
        } else {
            tracing::debug!(outcome = outcome.as_str(), "Dropdown write rolled back");
            lock_view(&self.view).picked = previous;
            SurfaceOutcome::Rejected(outcome)
        }
    }
}

impl Surface for DropdownSurface {
    fn source(&self) -> Source {
        Source::Dropdown
    }

    fn selected(&self) -> BTreeSet<LocationId> {
        lock_view(&self.view).picked.clone()
    }

    fn is_locked(&self) -> bool {
        lock_view(&self.view).locked
    }

    fn resync(&self) {
        let selected = self.store.selection();
        let locked = self.store.confirmation().is_confirmed();
        let mut view = lock_view(&self.view);
        view.picked = selected;
        view.locked = locked;
    }
}

impl Drop for DropdownSurface {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}

fn on_store_event(store: &Weak<SelectionStore>, view: &Mutex<DropdownView>, event: &StoreEvent) {
    let Some(store) = store.upgrade() else {
        return;
    };
    let mut view = lock_view(view);
    match event {
        StoreEvent::SelectionChanged(change) => {
            if change.source == Source::Dropdown && store.is_writer_busy(Source::Dropdown) {
                return;
            }
            view.picked = change.selection.clone();
        }
        StoreEvent::UniverseReplaced { .. } => view.picked.clear(),
        StoreEvent::Confirmed => view.locked = true,
        StoreEvent::Reset => {
            view.picked.clear();
            view.disabled.clear();
            view.locked = false;
        }
    }
}
