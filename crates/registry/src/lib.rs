//! Stable block/item id registry for moddable worlds.
//!
//! Extensions register blocks and items at startup; each entry gets a
//! numeric id inside its namespace range, and a compound item (the
//! inventory form of a block) shares its block's id. A persisted world
//! carries the name→id table it was saved with; on load, [`reconcile`]
//! maps that table back onto whatever is registered now, remapping drifted
//! ids, routing vanished names through the extension system's resolver,
//! and committing atomically or not at all.
//!
//! # Modules
//!
//! - [`ids`] - Id ranges, namespaces, and the persisted-name codec
//! - [`bitmap`] - Occupancy bitmap over the combined id space
//! - [`content`] - Registrable objects and their identity
//! - [`namespace`] - Per-namespace name↔id↔object maps
//! - [`state`] - The paired-namespace registry state
//! - [`hub`] - Live-state owner with freeze/revert and atomic commit
//! - [`hooks`] - Trait seams to the host: gate, backup, resolver
//! - [`persist`] - Persisted world data and diagnostic dumps
//! - [`reconcile`] - World-load reconciliation
//! - [`repair`] - Legacy single-range save repair

pub mod bitmap;
pub mod content;
pub mod error;
pub mod hooks;
pub mod hub;
pub mod ids;
pub mod namespace;
pub mod persist;
pub mod reconcile;
pub mod repair;
pub mod state;

pub use content::{Content, ContentHandle, ContentKind};
pub use error::{RegistryError, Result};
pub use hooks::{
	ExtensionHost, LoadGate, MappingResolver, MissingAction, MissingMapping, WorldBackup,
};
pub use hub::RegistryHub;
pub use ids::{Namespace, RawId};
pub use persist::{IdTable, PersistedWorld};
pub use reconcile::{ReconcileOutcome, RemapEntry, RemapTable, WorldReconciler};
pub use repair::fix_broken_ids;
pub use state::{RegistryState, StackDescriptor};

#[cfg(test)]
pub(crate) mod test_fixtures;
