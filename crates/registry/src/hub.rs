//! Owner of the live registry state.
//!
//! # Role
//!
//! The process-wide "current" state is an explicitly owned handle, not a
//! global: readers load an atomic snapshot, and mutation publishes a whole
//! replacement state. Readers therefore always see either the prior or the
//! fully reconciled next state, never a partial one.
//!
//! Freeze takes a consistency-checked deep copy once startup registration
//! completes; revert restores it after an aborted load attempt.

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::error::Result;
use crate::ids::RawId;
use crate::persist::IdTable;
use crate::state::RegistryState;

pub struct RegistryHub {
	live: ArcSwap<RegistryState>,
	frozen: ArcSwapOption<RegistryState>,
}

impl Default for RegistryHub {
	fn default() -> Self {
		Self::new()
	}
}

impl RegistryHub {
	pub fn new() -> Self {
		Self {
			live: ArcSwap::from_pointee(RegistryState::new()),
			frozen: ArcSwapOption::const_empty(),
		}
	}

	/// Current live state.
	pub fn live(&self) -> Arc<RegistryState> {
		self.live.load_full()
	}

	/// Mutates a copy of the live state and publishes it on success.
	///
	/// Registration and reconciliation are single-threaded phases; this is a
	/// copy-and-publish, not a compare-and-swap. On error the live state is
	/// left untouched.
	pub fn edit<R>(&self, f: impl FnOnce(&mut RegistryState) -> Result<R>) -> Result<R> {
		let mut next = (*self.live.load_full()).clone();
		let out = f(&mut next)?;
		self.live.store(Arc::new(next));
		Ok(out)
	}

	/// Consistency-checks the live state and stores it as the frozen
	/// reference snapshot.
	pub fn freeze(&self) -> Result<()> {
		tracing::debug!("freezing block and item id maps");
		let live = self.live.load_full();
		live.test_consistency()?;
		let frozen = live.snapshot();
		frozen.test_consistency()?;
		self.frozen.store(Some(Arc::new(frozen)));
		Ok(())
	}

	/// Restores the frozen snapshot as the live state. Returns false (and
	/// changes nothing) when freeze was never called.
	pub fn revert_to_frozen(&self) -> bool {
		match self.frozen.load_full() {
			None => {
				tracing::warn!("cannot revert to frozen registry state without freezing first");
				false
			}
			Some(frozen) => {
				tracing::debug!("reverting to frozen registry state");
				self.live.store(Arc::new(frozen.snapshot()));
				true
			}
		}
	}

	pub fn frozen(&self) -> Option<Arc<RegistryState>> {
		self.frozen.load_full()
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.load().is_some()
	}

	/// Atomically replaces the live state with a fully reconciled candidate.
	pub fn commit(&self, next: RegistryState) {
		self.live.store(Arc::new(next));
	}

	/// Exports the live state as a persisted id table.
	pub fn build_id_table(&self) -> IdTable {
		let mut table = IdTable::default();
		self.live.load().serialize_into(&mut table);
		table
	}

	/// Blocked ids of the live state, ascending.
	pub fn blocked_ids(&self) -> Vec<RawId> {
		self.live.load().blocked_ids()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::content::Content;
	use crate::ids::{Namespace, prefixed};

	/// Freeze, register more, revert: the pre-registration state comes back
	/// exactly.
	#[test]
	fn freeze_revert_round_trip() {
		let hub = RegistryHub::new();
		hub.edit(|state| {
			state.register(&Content::block(), "a:stone", None, None)?;
			state.block(9);
			Ok(())
		})
		.unwrap();
		hub.freeze().unwrap();
		let frozen_table = hub.build_id_table();

		hub.edit(|state| state.register(&Content::block(), "a:dirt", None, None))
			.unwrap();
		assert!(hub.live().blocks().contains_name("a:dirt"));

		assert!(hub.revert_to_frozen());
		assert_eq!(hub.build_id_table(), frozen_table);
		assert!(!hub.live().blocks().contains_name("a:dirt"));
		assert_eq!(hub.blocked_ids(), vec![9]);
		hub.live().test_consistency().unwrap();
	}

	/// Revert without a freeze is a no-op.
	#[test]
	fn revert_without_freeze_is_noop() {
		let hub = RegistryHub::new();
		hub.edit(|state| state.register(&Content::block(), "a:stone", None, None))
			.unwrap();
		assert!(!hub.is_frozen());
		assert!(!hub.revert_to_frozen());
		assert!(hub.live().blocks().contains_name("a:stone"));
	}

	/// A failed edit leaves the published state untouched.
	#[test]
	fn failed_edit_is_not_published() {
		let hub = RegistryHub::new();
		hub.edit(|state| state.register(&Content::block(), "a:stone", None, None))
			.unwrap();
		let before = hub.live();

		let dup = hub.edit(|state| {
			state.register(&Content::block(), "a:extra", None, None)?;
			// Same name, different object: must fail and roll the edit back.
			state.register(&Content::block(), "a:stone", None, None)
		});
		assert!(dup.is_err());
		assert!(Arc::ptr_eq(&before, &hub.live()), "failed edit must not publish");
		assert!(!hub.live().blocks().contains_name("a:extra"));
	}

	#[test]
	fn id_table_covers_both_namespaces() {
		let hub = RegistryHub::new();
		hub.edit(|state| {
			state.register(&Content::block(), "a:stone", None, None)?;
			state.register(&Content::item(), "a:stick", None, None)
		})
		.unwrap();
		let table = hub.build_id_table();
		assert_eq!(table.get(&prefixed(Namespace::Block, "a:stone")), Some(&0));
		assert_eq!(table.get(&prefixed(Namespace::Item, "a:stick")), Some(&4096));
	}
}
