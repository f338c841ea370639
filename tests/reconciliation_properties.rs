//! Property tests for the reconciliation protocol and the resolver.
//!
//! Interleavings are generated by proptest; time only moves through the
//! shared `ManualClock`.

mod common;

use basin_selector::basin_types::{
    CandidateUniverse, ChangeEnvelope, Level, LocationId, Source, Timestamp,
};
use basin_selector::{
    DropdownSurface, HierarchicalResolver, MapSurface, NoopRenderer, ProposalOutcome,
    SelectOutcome, SelectionStore, Surface,
};
use common::{basin_catalog, resolver_over, store, village};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const VILLAGES: [&str; 4] = ["A", "B", "C", "D"];
const LOCK_MS: u64 = 800;

fn universe() -> CandidateUniverse {
    CandidateUniverse::new(
        Some("D3".into()),
        VILLAGES.iter().map(|id| village(id, "D3", None)).collect(),
    )
}

fn subset(mask: u8) -> BTreeSet<LocationId> {
    VILLAGES
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, id)| LocationId::from(*id))
        .collect()
}

fn source(is_map: bool) -> Source {
    if is_map {
        Source::Map
    } else {
        Source::Dropdown
    }
}

fn envelope_at(store: &SelectionStore, source: Source, mask: u8, at: Timestamp) -> ChangeEnvelope {
    ChangeEnvelope::new(source, subset(mask), at, &store.universe())
}

/// One user action on a surface, after `advance_ms` of idle time.
#[derive(Debug, Clone)]
struct SurfaceOp {
    on_map: bool,
    mask: u8,
    advance_ms: u64,
}

fn arb_surface_ops() -> impl Strategy<Value = Vec<SurfaceOp>> {
    prop::collection::vec(
        (any::<bool>(), 0u8..16, 0u64..1_200).prop_map(|(on_map, mask, advance_ms)| SurfaceOp {
            on_map,
            mask,
            advance_ms,
        }),
        1..40,
    )
}

fn apply_op(map: &MapSurface, dropdown: &DropdownSurface, op: &SurfaceOp) {
    if op.on_map {
        let id = LocationId::from(VILLAGES[usize::from(op.mask) % VILLAGES.len()]);
        map.toggle(&id);
    } else {
        match op.mask {
            0 => {
                dropdown.clear();
            }
            15 => {
                dropdown.select_all();
            }
            mask => {
                dropdown.set_selection(subset(mask));
            }
        }
    }
}

/// Walk the hierarchy by candidate index; a missing candidate skips the step.
async fn select_nth(resolver: &HierarchicalResolver, level: Level, nth: usize) -> Option<SelectOutcome> {
    let candidates = resolver.candidates(level);
    if candidates.is_empty() {
        return None;
    }
    let id = candidates[nth % candidates.len()].id().clone();
    resolver.select_level(level, id).await.ok()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Changing a level always empties every level below it and the
    /// village selection.
    #[test]
    fn selection_clears_downstream(
        steps in prop::collection::vec((0usize..4, 0usize..3, 0u8..16), 1..20)
    ) {
        runtime().block_on(async {
            let (resolver, store, _clock) = resolver_over(Arc::new(basin_catalog()));
            let dropdown = DropdownSurface::attach(Arc::clone(&store));
            resolver.load_rivers().await;

            for (level_idx, nth, mask) in steps {
                let level = Level::ALL[level_idx];
                dropdown.set_selection(subset(mask));

                if let Some(SelectOutcome::Applied) = select_nth(&resolver, level, nth).await {
                    for below in level.downstream().filter(|l| *l != Level::Village) {
                        prop_assert_eq!(resolver.selected(below), None);
                    }
                    prop_assert!(store.selection().is_empty());
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Once writes stop for at least T2, both surfaces show the store's
    /// selection.
    #[test]
    fn surfaces_converge_after_quiet_period(ops in arb_surface_ops()) {
        let (store, clock) = store(200, LOCK_MS, 2000);
        store.replace_universe(universe());
        let map = MapSurface::attach(Arc::clone(&store), Arc::new(NoopRenderer));
        let dropdown = DropdownSurface::attach(Arc::clone(&store));

        for op in &ops {
            clock.advance_ms(op.advance_ms);
            store.tick();
            apply_op(&map, &dropdown, op);
        }

        clock.advance_ms(LOCK_MS);
        store.tick();

        let stored = store.selection();
        prop_assert_eq!(map.selected(), stored.clone());
        prop_assert_eq!(dropdown.selected(), stored);
        prop_assert_eq!(store.lock_window(), None);
    }

    /// Applying an envelope a second time changes nothing.
    #[test]
    fn replayed_envelope_is_a_no_op(
        first_mask in 0u8..16,
        on_map in any::<bool>(),
        gap_ms in 0u64..3_000,
    ) {
        let (store, clock) = store(200, LOCK_MS, 2000);
        store.replace_universe(universe());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        store.on_selection_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let envelope = envelope_at(&store, source(on_map), first_mask, store.now());
        prop_assert_eq!(store.propose(&envelope), ProposalOutcome::Accepted);
        let snapshot = store.snapshot();
        let lock = store.lock_state();

        clock.advance_ms(gap_ms);
        prop_assert_eq!(store.propose(&envelope), ProposalOutcome::Accepted);
        prop_assert_eq!(store.snapshot(), snapshot);
        prop_assert_eq!(store.lock_state(), lock);
        prop_assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    /// An envelope proposed before the stored snapshot is rejected whatever
    /// the lock state.
    #[test]
    fn older_envelope_is_always_stale(
        lead_ms in 1u64..1_000,
        wait_ms in 0u64..5_000,
        stale_is_map in any::<bool>(),
        writer_is_map in any::<bool>(),
        mask in 0u8..16,
    ) {
        let (store, clock) = store(200, LOCK_MS, 2000);
        store.replace_universe(universe());
        let built_at = store.now();

        clock.advance_ms(lead_ms);
        let fresh = envelope_at(&store, source(writer_is_map), 0b0011, store.now());
        prop_assert!(store.propose(&fresh).is_accepted());

        clock.advance_ms(wait_ms);
        store.tick();
        let before = store.snapshot();
        let stale = envelope_at(&store, source(stale_is_map), mask, built_at);

        prop_assert_eq!(store.propose(&stale), ProposalOutcome::RejectedStale);
        prop_assert_eq!(store.snapshot(), before);
    }

    /// Accepted envelopes from different sources never fall inside each
    /// other's lock window.
    #[test]
    fn lock_windows_never_overlap(
        writes in prop::collection::vec((any::<bool>(), 0u8..16, 0u64..1_200), 1..40)
    ) {
        let (store, clock) = store(200, LOCK_MS, 2000);
        store.replace_universe(universe());
        let mut accepted: Vec<(Source, Timestamp)> = Vec::new();

        for (on_map, mask, advance_ms) in writes {
            clock.advance_ms(advance_ms);
            store.tick();
            let envelope = envelope_at(&store, source(on_map), mask, store.now());
            if store.propose(&envelope).is_accepted() {
                accepted.push((envelope.source(), envelope.proposed_at()));
            }
        }

        for pair in accepted.windows(2) {
            let ((prev_source, prev_at), (next_source, next_at)) = (pair[0], pair[1]);
            if prev_source != next_source {
                prop_assert!(
                    next_at.as_millis() >= prev_at.as_millis() + LOCK_MS,
                    "{} at {} overlapped {} at {}",
                    next_source, next_at, prev_source, prev_at
                );
            }
        }
    }

    /// After confirm no surface call moves the selection.
    #[test]
    fn confirmed_selection_never_changes(
        initial in 1u8..16,
        ops in arb_surface_ops(),
    ) {
        let (store, clock) = store(200, LOCK_MS, 2000);
        store.replace_universe(universe());
        let map = MapSurface::attach(Arc::clone(&store), Arc::new(NoopRenderer));
        let dropdown = DropdownSurface::attach(Arc::clone(&store));

        dropdown.set_selection(subset(initial));
        prop_assert!(store.confirm().is_ok());
        let frozen = store.selection();

        for op in &ops {
            clock.advance_ms(op.advance_ms);
            store.tick();
            apply_op(&map, &dropdown, op);
            prop_assert_eq!(store.selection(), frozen.clone());
        }
        prop_assert!(store.confirmation().is_confirmed());
    }
}
