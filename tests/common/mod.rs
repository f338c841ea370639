//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use basin_selector::basin_types::{
    Catchment, Drain, Level, LocationId, LocationNode, River, Stretch, Village,
};
use basin_selector::catalog::Result as CatalogResult;
use basin_selector::{
    CatalogError, HierarchicalResolver, LocationCatalog, ManualClock, SelectionStore,
    StaticCatalog, TimingConfig,
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn village(id: &str, drain: &str, catchment: Option<&str>) -> Village {
    Village {
        id: id.into(),
        name: format!("Village {id}"),
        drain_id: drain.into(),
        catchment_id: catchment.map(LocationId::from),
        drain_no: drain.trim_start_matches('D').parse().unwrap_or(0),
        population: 500,
        district: "Varanasi".into(),
        sub_district: "Pindra".into(),
        state: "Uttar Pradesh".into(),
    }
}

/// R1, R2 → S7 (under R1) → D3, D4 → C1 (under D3) → villages.
pub fn basin_catalog() -> StaticCatalog {
    let mut nodes = vec![
        LocationNode::River(River {
            id: "R1".into(),
            name: "Varuna".into(),
        }),
        LocationNode::River(River {
            id: "R2".into(),
            name: "Assi".into(),
        }),
        LocationNode::Stretch(Stretch {
            id: "S7".into(),
            name: "Upper Varuna".into(),
            river_id: "R1".into(),
        }),
        LocationNode::Stretch(Stretch {
            id: "S9".into(),
            name: "Assi Ghat".into(),
            river_id: "R2".into(),
        }),
    ];
    for (id, no) in [("D3", 3), ("D4", 4)] {
        nodes.push(LocationNode::Drain(Drain {
            id: id.into(),
            name: format!("Nala {no}"),
            stretch_id: "S7".into(),
            drain_no: no,
        }));
    }
    nodes.push(LocationNode::Catchment(Catchment {
        id: "C1".into(),
        name: "East bank".into(),
        drain_id: "D3".into(),
    }));
    for v in [
        village("V1", "D3", Some("C1")),
        village("V2", "D3", Some("C1")),
        village("V3", "D3", None),
        village("V40", "D4", None),
        village("V41", "D4", None),
    ] {
        nodes.push(LocationNode::Village(v));
    }
    StaticCatalog::new(nodes)
}

/// Store over a manual clock, with T1/T2/T3 given in milliseconds.
pub fn store(busy_ms: u64, lock_ms: u64, stale_ms: u64) -> (Arc<SelectionStore>, ManualClock) {
    let clock = ManualClock::starting_at(1_000);
    let timing = TimingConfig::new(busy_ms, lock_ms, stale_ms).unwrap();
    let store = Arc::new(SelectionStore::new(timing, Arc::new(clock.clone())));
    (store, clock)
}

pub fn resolver_over(
    catalog: Arc<dyn LocationCatalog>,
) -> (HierarchicalResolver, Arc<SelectionStore>, ManualClock) {
    let (store, clock) = store(200, 800, 2000);
    let resolver = HierarchicalResolver::new(catalog, Arc::clone(&store));
    (resolver, store, clock)
}

/// Catalog that holds one chosen request until released.
pub struct GatedCatalog {
    inner: StaticCatalog,
    gate: Mutex<Option<(Level, LocationId)>>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedCatalog {
    pub fn new(inner: StaticCatalog) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Hold the next request for `level` children of `parent`.
    pub fn hold(&self, level: Level, parent: &str) {
        *self.gate.lock().unwrap() = Some((level, parent.into()));
    }
}

#[async_trait]
impl LocationCatalog for GatedCatalog {
    async fn children(
        &self,
        level: Level,
        parent: Option<&LocationId>,
    ) -> CatalogResult<Vec<LocationNode>> {
        let held = {
            let mut gate = self.gate.lock().unwrap();
            let matches = matches!(
                (gate.as_ref(), parent),
                (Some((l, p)), Some(parent)) if *l == level && p == parent
            );
            if matches {
                gate.take();
            }
            matches
        };
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.children(level, parent).await
    }
}

/// Catalog that fails every request for one level.
pub struct FailingCatalog {
    pub inner: StaticCatalog,
    pub failing: Level,
}

#[async_trait]
impl LocationCatalog for FailingCatalog {
    async fn children(
        &self,
        level: Level,
        parent: Option<&LocationId>,
    ) -> CatalogResult<Vec<LocationNode>> {
        if level == self.failing {
            return Err(CatalogError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            });
        }
        self.inner.children(level, parent).await
    }
}
