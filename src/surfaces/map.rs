//! Map surface adapter
//!
//! Clicking a polygon flips one village. Styling is delegated to a
//! [`FeatureRenderer`]; this adapter only decides which features are
//! highlighted.

use super::{precheck, submit, Surface, SurfaceOutcome};
use crate::store::{SelectionStore, StoreEvent, SubscriptionId};
use basin_types::{LocationId, Source};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Collaborator that restyles rendered features.
pub trait FeatureRenderer: Send + Sync {
    fn refresh_styles(&self, selected: &BTreeSet<LocationId>);
}

/// Renderer that does nothing, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl FeatureRenderer for NoopRenderer {
    fn refresh_styles(&self, _selected: &BTreeSet<LocationId>) {}
}

#[derive(Debug, Default)]
struct MapView {
    highlighted: BTreeSet<LocationId>,
    locked: bool,
}

type SharedView = Arc<Mutex<MapView>>;

fn lock_view(view: &Mutex<MapView>) -> MutexGuard<'_, MapView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MapSurface {
    store: Arc<SelectionStore>,
    renderer: Arc<dyn FeatureRenderer>,
    view: SharedView,
    subscription: SubscriptionId,
}

impl MapSurface {
    /// Attach to a store and start following its events.
    pub fn attach(store: Arc<SelectionStore>, renderer: Arc<dyn FeatureRenderer>) -> Self {
        let view: SharedView = Arc::new(Mutex::new(MapView {
            highlighted: store.selection(),
            locked: store.confirmation().is_confirmed(),
        }));

        let weak_store = Arc::downgrade(&store);
        let listener_view = Arc::clone(&view);
        let listener_renderer = Arc::clone(&renderer);
        let subscription = store.subscribe(move |event| {
            on_store_event(&weak_store, &listener_view, listener_renderer.as_ref(), event);
        });

        Self {
            store,
            renderer,
            view,
            subscription,
        }
    }

    /// Flip one village.
    pub fn toggle(&self, id: &LocationId) -> SurfaceOutcome {
        if let Some(outcome) = precheck(&self.store, Source::Map) {
            return outcome;
        }
        let universe = self.store.universe();
        if !universe.contains(id) {
            tracing::debug!(%id, "Toggle ignored: village not in current universe");
            return SurfaceOutcome::Ignored;
        }

        let mut proposed = self.store.selection();
        if !proposed.remove(id) {
            proposed.insert(id.clone());
        }
        let previous = {
            let mut view = lock_view(&self.view);
            std::mem::replace(&mut view.highlighted, proposed.clone())
        };

        let outcome = submit(&self.store, Source::Map, proposed, &universe);
        if outcome.is_accepted() {
            let selected = self.store.selection();
            lock_view(&self.view).highlighted = selected.clone();
            self.renderer.refresh_styles(&selected);
            SurfaceOutcome::Accepted
        } else {
            tracing::debug!(%id, outcome = outcome.as_str(), "Toggle rolled back");
            lock_view(&self.view).highlighted = previous;
            SurfaceOutcome::Rejected(outcome)
        }
    }

    pub fn is_highlighted(&self, id: &LocationId) -> bool {
        lock_view(&self.view).highlighted.contains(id)
    }
}

impl Surface for MapSurface {
    fn source(&self) -> Source {
        Source::Map
    }

    fn selected(&self) -> BTreeSet<LocationId> {
        lock_view(&self.view).highlighted.clone()
    }

    fn is_locked(&self) -> bool {
        lock_view(&self.view).locked
    }

    fn resync(&self) {
        let selected = self.store.selection();
        {
            let mut view = lock_view(&self.view);
            view.highlighted = selected.clone();
            view.locked = self.store.confirmation().is_confirmed();
        }
        self.renderer.refresh_styles(&selected);
    }
}

impl Drop for MapSurface {
    fn drop(&mut self) {
        // A lock held by this surface is left to lapse on its own.
        self.store.unsubscribe(self.subscription);
    }
}

fn on_store_event(
    store: &Weak<SelectionStore>,
    view: &Mutex<MapView>,
    renderer: &dyn FeatureRenderer,
    event: &StoreEvent,
) {
    let Some(store) = store.upgrade() else {
        return;
    };
    match event {
        StoreEvent::SelectionChanged(change) => {
            if change.source == Source::Map && store.is_writer_busy(Source::Map) {
                tracing::trace!("Map ignoring echo of its own write");
                return;
            }
            lock_view(view).highlighted = change.selection.clone();
            renderer.refresh_styles(&change.selection);
        }
        StoreEvent::UniverseReplaced { .. } => {
            lock_view(view).highlighted.clear();
            renderer.refresh_styles(&BTreeSet::new());
        }
        StoreEvent::Confirmed => {
            lock_view(view).locked = true;
        }
        StoreEvent::Reset => {
            {
                let mut view = lock_view(view);
                view.highlighted.clear();
                view.locked = false;
            }
            renderer.refresh_styles(&BTreeSet::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TimingConfig;
    use crate::protocol::ProposalOutcome;
    use basin_types::{CandidateUniverse, ChangeEnvelope, Village};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<BTreeSet<LocationId>>>,
    }

    impl FeatureRenderer for RecordingRenderer {
        fn refresh_styles(&self, selected: &BTreeSet<LocationId>) {
            self.calls.lock().unwrap().push(selected.clone());
        }
    }

    fn village(id: &str) -> Village {
        Village {
            id: id.into(),
            name: id.into(),
            drain_id: "D3".into(),
            catchment_id: None,
            drain_no: 3,
            population: 10,
            district: "Varanasi".into(),
            sub_district: "Pindra".into(),
            state: "Uttar Pradesh".into(),
        }
    }

    fn setup() -> (Arc<SelectionStore>, ManualClock, MapSurface, Arc<RecordingRenderer>) {
        let clock = ManualClock::starting_at(10_000);
        let store = Arc::new(SelectionStore::new(
            TimingConfig::new(200, 500, 2000).unwrap(),
            Arc::new(clock.clone()),
        ));
        store.replace_universe(CandidateUniverse::new(
            Some("D3".into()),
            vec![village("A"), village("B"), village("C")],
        ));
        let renderer = Arc::new(RecordingRenderer::default());
        let map = MapSurface::attach(Arc::clone(&store), renderer.clone());
        (store, clock, map, renderer)
    }

    #[test]
    fn toggle_flips_and_restyles() {
        let (store, clock, map, renderer) = setup();

        assert_eq!(map.toggle(&"B".into()), SurfaceOutcome::Accepted);
        assert!(map.is_highlighted(&"B".into()));
        assert_eq!(store.snapshot().source, Some(Source::Map));

        clock.advance_ms(50);
        assert_eq!(map.toggle(&"B".into()), SurfaceOutcome::Accepted);
        assert!(store.selection().is_empty());
        assert_eq!(renderer.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn blocked_toggle_leaves_view_untouched() {
        let (store, clock, map, _renderer) = setup();
        let all: BTreeSet<LocationId> = store.universe().ids();
        let envelope = ChangeEnvelope::new(Source::Dropdown, all.clone(), store.now(), &store.universe());
        store.propose(&envelope);

        clock.advance_ms(50);
        let outcome = map.toggle(&"B".into());

        assert_eq!(outcome, SurfaceOutcome::Rejected(ProposalOutcome::RejectedLocked));
        assert_eq!(map.selected(), all);
        assert_eq!(store.selection(), all);
    }

    #[test]
    fn unknown_village_is_ignored() {
        let (_store, _clock, map, _renderer) = setup();
        assert_eq!(map.toggle(&"Z".into()), SurfaceOutcome::Ignored);
    }

    #[test]
    fn confirmed_map_is_inert_and_locked() {
        let (store, _clock, map, _renderer) = setup();
        map.toggle(&"A".into());
        store.confirm().unwrap();

        assert!(map.is_locked());
        assert_eq!(map.toggle(&"C".into()), SurfaceOutcome::Inert);

        store.reset();
        assert!(!map.is_locked());
        assert!(map.selected().is_empty());
    }

    #[test]
    fn drop_unsubscribes() {
        let (store, clock, map, renderer) = setup();
        drop(map);
        clock.advance_ms(1);
        let envelope = ChangeEnvelope::new(
            Source::Dropdown,
            ["A".into()].into_iter().collect(),
            store.now(),
            &store.universe(),
        );
        assert!(store.propose(&envelope).is_accepted());
        assert!(renderer.calls.lock().unwrap().is_empty());
    }
}
