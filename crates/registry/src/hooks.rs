//! External capabilities the registry calls during load.
//!
//! # Role
//!
//! The extension host, the interactive confirmation gate, the world backup
//! utility, and the missing-mapping resolver are out of scope for the
//! registry core; they appear here only as the trait seams the core needs.
//! All of them are blocking, synchronous calls.

use crate::content::ContentHandle;
use crate::ids::{Namespace, RawId};
use crate::reconcile::RemapTable;
use crate::state::RegistryState;

/// Interactive confirmation/abort gate for destructive operations.
///
/// Declining a confirmation aborts the surrounding load attempt; the caller
/// surfaces that as [`crate::RegistryError::LoadAborted`].
pub trait LoadGate {
	/// Blocking yes/no prompt.
	fn confirm(&self, message: &str) -> bool;
	/// Non-blocking informational notice.
	fn notify(&self, message: &str);
}

/// Durable world backup primitive.
pub trait WorldBackup {
	/// Snapshots the current world data to durable storage.
	fn backup_world(&self) -> std::io::Result<()>;
}

/// Queries against the extension loading system.
pub trait ExtensionHost {
	/// Whether the named extension is currently installed and active.
	fn is_loaded(&self, ext: &str) -> bool;
	/// Identity of the extension currently registering content, if any.
	fn active_extension(&self) -> Option<String>;
}

/// One persisted name the reconciler could not resolve against the live
/// registry. The resolver decides its fate via [`MissingMapping::action`].
#[derive(Debug)]
pub struct MissingMapping {
	pub namespace: Namespace,
	/// Qualified name, without the persisted sentinel prefix.
	pub name: String,
	/// Id the persisted world assigned to the name.
	pub id: RawId,
	pub action: MissingAction,
}

impl MissingMapping {
	pub(crate) fn new(namespace: Namespace, name: String, id: RawId) -> Self {
		Self {
			namespace,
			name,
			id,
			action: MissingAction::Default,
		}
	}

	/// Substitute another live object for the missing name, keeping the
	/// persisted id. An alias from the old name to the target's name is
	/// recorded.
	pub fn remap(&mut self, target: ContentHandle) {
		self.action = MissingAction::Remap(target);
	}

	pub fn ignore(&mut self) {
		self.action = MissingAction::Ignore;
	}

	pub fn warn(&mut self) {
		self.action = MissingAction::Warn;
	}

	pub fn fail(&mut self) {
		self.action = MissingAction::Fail;
	}
}

/// Disposition for a missing mapping.
#[derive(Clone, Debug, Default)]
pub enum MissingAction {
	/// No decision: treated as data loss, requiring user confirmation and a
	/// backup before the load continues. The id is blocked.
	#[default]
	Default,
	/// Substitute a live object at the persisted id.
	Remap(ContentHandle),
	/// Drop the entry silently; the id is left free.
	Ignore,
	/// Accept with a logged warning; the id is blocked.
	Warn,
	/// Reject the whole load, leaving the live state unchanged.
	Fail,
}

/// Callback into the extension system for missing-mapping resolution and
/// remap notification.
pub trait MappingResolver {
	/// Called once per load with every name the reconciler could not find.
	/// Implementations set an action on each entry; entries left untouched
	/// keep [`MissingAction::Default`].
	fn resolve_missing(
		&self,
		missing: &mut [MissingMapping],
		is_local_world: bool,
		candidate: &RegistryState,
		remaps: &RemapTable,
	);

	/// Informational, fired after a successful commit.
	fn remap_notify(&self, remaps: &RemapTable) {
		let _ = remaps;
	}
}
