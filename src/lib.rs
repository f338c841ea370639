//! Basin Selector - Cross-Surface Village Selection
//!
//! Two interactive surfaces (a map and a multi-select dropdown) edit one
//! shared set of selected villages. The set is scoped by a cascading
//! river → stretch → drain → catchment resolver, and a small reconciliation
//! protocol keeps the two writers from clobbering each other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LocationCatalog (HTTP or static)                               │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │ children(level, parent)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  HierarchicalResolver                                           │
//! │  level views, downstream reset, superseded-fetch discard        │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │ replace_universe
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SelectionStore + ReconciliationProtocol                        │
//! │  snapshot, lock window (T2), busy flag (T1), staleness (T3)     │
//! └─────────────────────────────────────────────────────────────────┘
//!               ▲ propose                         ▲ propose
//!               │ StoreEvent                      │ StoreEvent
//!        ┌──────┴──────┐                   ┌──────┴────────┐
//!        │ MapSurface  │                   │ DropdownSurface│
//!        └─────────────┘                   └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use basin_selector::{SelectionSession, SelectorConfig, HttpCatalog, LogReportSink};
//!
//! let config = SelectorConfig::from_file("config/selector.yaml")?;
//! let catalog = Arc::new(HttpCatalog::new(config.catalog.clone())?);
//! let (session, clock) = SelectionSession::from_config(&config, catalog, Arc::new(LogReportSink));
//! let timers = session.start_timers(clock);
//!
//! session.load_rivers().await;
//! session.select(Level::River, "R1").await?;
//! session.dropdown().select_all();
//! let report = session.confirm()?;
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod surfaces;

// Re-export main types
pub use catalog::{HttpCatalog, LocationCatalog, StaticCatalog};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CatalogConfig, SelectorConfig, TimingConfig};
pub use error::{CatalogError, ConfigError, ConfirmError, ResolverError};
pub use protocol::{LockState, LockWindow, ProposalOutcome, ReconciliationProtocol};
pub use resolver::{HierarchicalResolver, LevelView, SelectOutcome};
pub use scheduler::{run_timer_driver, Scheduler, TimerHandle};
pub use session::{LogReportSink, ReportSink, SelectionSession, TimerDriver};
pub use store::{SelectionChange, SelectionStore, StoreEvent, StoreTimer, SubscriptionId};
pub use surfaces::{
    DropdownOption, DropdownSurface, FeatureRenderer, MapSurface, NoopRenderer, OptionGroup,
    Surface, SurfaceOutcome,
};

pub use basin_types;
