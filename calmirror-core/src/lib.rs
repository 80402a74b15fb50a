//! Reconciliation engine for calmirror.
//!
//! This crate turns ICS subscription events into canonical events and works out
//! the create/update operations needed to mirror them into a destination
//! calendar:
//! - `canonical` derives stable ids and normalizes times
//! - `transform` runs per-destination overrides before matching
//! - `equality` and `reconcile` decide what to create or update
//! - `orchestrator` drives all of it through the collaborator traits in `ports`

pub mod canonical;
pub mod equality;
pub mod error;
pub mod event;
pub mod ics;
pub mod orchestrator;
pub mod ports;
pub mod reconcile;
pub mod transform;
pub mod vtimezone;

pub use error::{MirrorError, MirrorResult};
pub use event::*;
pub use orchestrator::{Orchestrator, RunOptions, RunReport, SyncStats};
pub use reconcile::Operation;
pub use transform::{OverrideFn, OverrideRegistry};
