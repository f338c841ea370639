//! Shared types for the basin selector
//!
//! This crate is the SINGLE SOURCE OF TRUTH for the types crossing the
//! catalog, surface and reporting boundaries.
//!
//! ## Boundaries
//!
//! ```text
//! ┌──────────────────┐  nodes   ┌──────────────────┐  envelopes  ┌──────────────────┐
//! │ Location catalog │ ───────► │ Resolver / Store │ ◄────────── │ Map / Dropdown   │
//! └──────────────────┘          └──────────────────┘             └──────────────────┘
//!                                        │ confirmed artifact
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │ Reporting        │
//!                               └──────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. Hierarchy records are tagged variants: `#[serde(tag = "level")]`
//! 2. Every level carries its own required fields - no optional catch-alls
//! 3. Envelopes are immutable once built

pub mod location;
pub mod report;
pub mod selection;

pub use location::*;
pub use report::*;
pub use selection::*;
