//! Selection session
//!
//! Wires one catalog, one resolver, one store and both surfaces together
//! for a single page. Confirming produces the [`ConfirmedSelection`]
//! artifact and hands it to a [`ReportSink`].

use crate::catalog::LocationCatalog;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{SelectorConfig, TimingConfig};
use crate::error::{ConfirmError, ResolverError};
use crate::resolver::{HierarchicalResolver, SelectOutcome};
use crate::scheduler::run_timer_driver;
use crate::store::SelectionStore;
use crate::surfaces::{DropdownSurface, FeatureRenderer, MapSurface, NoopRenderer};
use basin_types::{ConfirmedSelection, Level, LocationId};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receives the confirmed artifact (the reporting section of the page).
pub trait ReportSink: Send + Sync {
    fn publish(&self, selection: &ConfirmedSelection);
}

/// Sink that logs a summary of each confirmed selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn publish(&self, selection: &ConfirmedSelection) {
        tracing::info!(
            state = %selection.state_name,
            villages = selection.village_count,
            population = selection.total_population,
            "Selection report published"
        );
    }
}

/// Handle on a spawned timer driver.
pub struct TimerDriver {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TimerDriver {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "Timer driver task failed");
        }
    }
}

pub struct SelectionSession {
    store: Arc<SelectionStore>,
    resolver: HierarchicalResolver,
    map: MapSurface,
    dropdown: DropdownSurface,
    sink: Arc<dyn ReportSink>,
}

impl SelectionSession {
    pub fn new(
        catalog: Arc<dyn LocationCatalog>,
        timing: TimingConfig,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn FeatureRenderer>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let store = Arc::new(SelectionStore::new(timing, clock));
        let resolver = HierarchicalResolver::new(catalog, Arc::clone(&store));
        let map = MapSurface::attach(Arc::clone(&store), renderer);
        let dropdown = DropdownSurface::attach(Arc::clone(&store));
        Self {
            store,
            resolver,
            map,
            dropdown,
            sink,
        }
    }

    /// Headless session on the monotonic clock. The returned clock is the
    /// one to hand to [`SelectionSession::start_timers`].
    pub fn from_config(
        config: &SelectorConfig,
        catalog: Arc<dyn LocationCatalog>,
        sink: Arc<dyn ReportSink>,
    ) -> (Self, MonotonicClock) {
        let clock = MonotonicClock::new();
        let session = Self::new(
            catalog,
            config.timing,
            Arc::new(clock.clone()),
            Arc::new(NoopRenderer),
            sink,
        );
        (session, clock)
    }

    /// Spawn the tokio task that fires the store's timers.
    pub fn start_timers(&self, clock: MonotonicClock) -> TimerDriver {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(run_timer_driver(Arc::clone(&self.store), clock, receiver));
        TimerDriver { shutdown, task }
    }

    pub fn store(&self) -> &Arc<SelectionStore> {
        &self.store
    }

    pub fn resolver(&self) -> &HierarchicalResolver {
        &self.resolver
    }

    pub fn map(&self) -> &MapSurface {
        &self.map
    }

    pub fn dropdown(&self) -> &DropdownSurface {
        &self.dropdown
    }

    pub async fn load_rivers(&self) -> SelectOutcome {
        self.resolver.load_rivers().await
    }

    pub async fn select(
        &self,
        level: Level,
        id: impl Into<LocationId>,
    ) -> Result<SelectOutcome, ResolverError> {
        self.resolver.select_level(level, id.into()).await
    }

    /// Freeze the selection and publish the report. The resolver and both
    /// surfaces go inert until [`SelectionSession::reset`].
    pub fn confirm(&self) -> Result<ConfirmedSelection, ConfirmError> {
        let villages = self.store.confirm()?;
        let report = ConfirmedSelection::from_villages(&villages, Utc::now());
        self.sink.publish(&report);
        Ok(report)
    }

    /// Page-level reset: every level, the selection and the confirmation.
    pub fn reset(&self) {
        self.resolver.reset();
        self.store.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::clock::ManualClock;
    use crate::surfaces::{Surface, SurfaceOutcome};
    use basin_types::{Drain, LocationNode, River, Stretch, Village};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        reports: Mutex<Vec<ConfirmedSelection>>,
    }

    impl ReportSink for CollectingSink {
        fn publish(&self, selection: &ConfirmedSelection) {
            self.reports.lock().unwrap().push(selection.clone());
        }
    }

    fn village(id: &str, population: u64, sub_district: &str) -> LocationNode {
        LocationNode::Village(Village {
            id: id.into(),
            name: format!("Village {id}"),
            drain_id: "D3".into(),
            catchment_id: None,
            drain_no: 3,
            population,
            district: "Varanasi".into(),
            sub_district: sub_district.into(),
            state: "Uttar Pradesh".into(),
        })
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            LocationNode::River(River {
                id: "R1".into(),
                name: "Varuna".into(),
            }),
            LocationNode::Stretch(Stretch {
                id: "S7".into(),
                name: "Upper".into(),
                river_id: "R1".into(),
            }),
            LocationNode::Drain(Drain {
                id: "D3".into(),
                name: "Nala 3".into(),
                stretch_id: "S7".into(),
                drain_no: 3,
            }),
            village("V1", 1_200, "Pindra"),
            village("V2", 800, "Sadar"),
        ])
    }

    fn session() -> (SelectionSession, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let session = SelectionSession::new(
            Arc::new(catalog()),
            TimingConfig::default(),
            Arc::new(ManualClock::new()),
            Arc::new(NoopRenderer),
            sink.clone(),
        );
        (session, sink)
    }

    async fn walk(session: &SelectionSession) {
        session.load_rivers().await;
        session.select(Level::River, "R1").await.unwrap();
        session.select(Level::Stretch, "S7").await.unwrap();
        session.select(Level::Drain, "D3").await.unwrap();
    }

    #[tokio::test]
    async fn confirm_publishes_report_and_freezes() {
        let (session, sink) = session();
        walk(&session).await;
        assert!(session.dropdown().select_all().is_accepted());

        let report = session.confirm().unwrap();
        assert_eq!(report.village_count, 2);
        assert_eq!(report.total_population, 2_000);
        assert_eq!(report.state_name, "Uttar Pradesh");
        assert_eq!(sink.reports.lock().unwrap().len(), 1);

        assert!(session.map().is_locked());
        assert!(session.dropdown().is_locked());
        assert_eq!(session.map().toggle(&"V1".into()), SurfaceOutcome::Inert);
        assert_eq!(
            session.select(Level::River, "R1").await.unwrap(),
            SelectOutcome::Frozen
        );
        assert_eq!(session.confirm(), Err(ConfirmError::AlreadyConfirmed));
    }

    #[tokio::test]
    async fn reset_returns_to_initial_state() {
        let (session, _sink) = session();
        walk(&session).await;
        session.dropdown().select_all();
        session.confirm().unwrap();

        session.reset();

        assert!(!session.store().confirmation().is_confirmed());
        assert!(session.store().universe().is_empty());
        assert!(session.resolver().path().is_empty());
        assert!(!session.map().is_locked());
        assert!(session.dropdown().selected().is_empty());

        assert_eq!(session.load_rivers().await, SelectOutcome::Applied);
        assert_eq!(session.resolver().candidates(Level::River).len(), 1);
    }

    #[tokio::test]
    async fn timer_driver_stops_on_shutdown() {
        let (session, clock) = SelectionSession::from_config(
            &SelectorConfig::default(),
            Arc::new(catalog()),
            Arc::new(LogReportSink),
        );
        let driver = session.start_timers(clock);
        driver.stop().await;
    }
}
