//! Best-effort repair of ids inherited from the single-range id scheme.
//!
//! # Role
//!
//! Saves written before the block/item ranges were separated can carry items
//! that collide with blocks or sit away from their paired block. This pass
//! rewrites the persisted table in place before reconciliation ever sees it:
//! items are relocated onto their block's id where possible and dropped
//! where not, preferring to lose items over blocks. It consults the live
//! state only for existence checks and never the missing-mapping resolver;
//! that policy belongs to reconciliation.

use rustc_hash::FxHashSet;

use crate::bitmap::SlotBitmap;
use crate::error::{RegistryError, Result};
use crate::hooks::{ExtensionHost, LoadGate, WorldBackup};
use crate::ids::{self, Namespace, RawId};
use crate::persist::PersistedWorld;
use crate::state::RegistryState;

/// Scheduled outcome for one persisted item entry.
enum Repair {
	Remove,
	Relocate(RawId),
}

/// Repairs broken item ids in `world`, prompting and backing up before any
/// destructive change. The table and blocked set are modified only after
/// both confirmations and a successful backup.
pub fn fix_broken_ids(
	world: &mut PersistedWorld,
	live: &RegistryState,
	gate: &impl LoadGate,
	backup: &impl WorldBackup,
	host: &impl ExtensionHost,
) -> Result<()> {
	let mut occupied = SlotBitmap::new();

	// Reserve every id held by a persisted block first; blocks never move.
	for (name, &id) in &world.table {
		if matches!(ids::split_prefixed(name), Some((Namespace::Block, _))) {
			occupied.set(id);
		}
	}

	let mut new_blocked: FxHashSet<RawId> = FxHashSet::default();
	let mut to_remove: Vec<String> = Vec::new();
	let mut to_relocate: Vec<(String, RawId)> = Vec::new();

	for (prefixed_name, &old_id) in &world.table {
		let Some((Namespace::Item, name)) = ids::split_prefixed(prefixed_name) else {
			continue;
		};
		// Block old_id unless a block legitimately owns it.
		let mut block_this_id = false;

		let repair = match live.items().get_by_name(name) {
			None => {
				tracing::warn!(name, old_id, "item is no longer available and cannot be fixed");
				block_this_id = true;
				Some(Repair::Remove)
			}
			Some(item) if item.compound_block().is_some() => {
				let block_key = ids::prefixed(Namespace::Block, name);
				match world.table.get(&block_key) {
					Some(&block_id) if block_id != old_id => {
						// Mis-located compound item: relocate onto its block.
						tracing::warn!(
							name,
							old_id,
							block_id,
							"compound item does not share its block's id"
						);
						block_this_id = true;
						Some(Repair::Relocate(block_id))
					}
					Some(_) => {
						occupied.set(old_id);
						None
					}
					None => {
						// The item was plain when saved but is compound now.
						tracing::warn!(
							name,
							old_id,
							"item has been migrated to a compound item and cannot be fixed"
						);
						block_this_id = true;
						Some(Repair::Remove)
					}
				}
			}
			Some(_) if occupied.is_set(old_id) => {
				tracing::warn!(
					name,
					old_id,
					"item conflicts with another block or item and cannot be fixed"
				);
				Some(Repair::Remove)
			}
			Some(_) => {
				occupied.set(old_id);
				None
			}
		};

		match repair {
			Some(Repair::Remove) => to_remove.push(prefixed_name.clone()),
			Some(Repair::Relocate(id)) => to_relocate.push((prefixed_name.clone(), id)),
			None => {}
		}

		// There may still be stacks in the world referencing the old id; keep
		// it out of circulation unless a block occupies it.
		if block_this_id && !occupied.is_set(old_id) {
			new_blocked.insert(old_id);
			occupied.set(old_id);
		}
	}

	if to_remove.is_empty() && to_relocate.is_empty() {
		return Ok(());
	}

	let text = format!(
		"This save predates the split block/item id ranges and is damaged.\n\n\
		 An automatic repair can restore most of it; a world backup will be \
		 created first.\n\n\
		 {} items need to be removed.\n{} items need to be relocated.",
		to_remove.len(),
		to_relocate.len()
	);
	if !gate.confirm(&text) {
		return Err(RegistryError::LoadAborted);
	}

	// Second gate: name every extension whose content is about to be dropped
	// because it is not installed.
	let mut missing_exts: Vec<&str> = to_remove
		.iter()
		.filter_map(|prefixed_name| ids::split_prefixed(prefixed_name))
		.filter_map(|(_, name)| ids::extension_of(name))
		.filter(|ext| !host.is_loaded(ext))
		.collect();
	missing_exts.sort_unstable();
	missing_exts.dedup();

	if !missing_exts.is_empty() {
		let mut text = format!(
			"{} extensions providing content in this save are missing.\n\
			 If you continue, their items will be removed during the repair.\n\n\
			 Missing extensions:\n",
			missing_exts.len()
		);
		for ext in &missing_exts {
			text.push_str(ext);
			text.push('\n');
		}
		if !gate.confirm(&text) {
			return Err(RegistryError::LoadAborted);
		}
	}

	if let Err(e) = backup.backup_world() {
		gate.notify(&format!("The world backup could not be created.\n\n{e}"));
		return Err(RegistryError::BackupFailed(e));
	}

	// Apply only after both gates and the backup.
	for prefixed_name in &to_remove {
		let removed = world.table.shift_remove(prefixed_name);
		tracing::warn!(name = %prefixed_name[1..], old_id = ?removed, "removed item");
	}
	for (prefixed_name, new_id) in &to_relocate {
		let old = world.table.insert(prefixed_name.clone(), *new_id);
		tracing::warn!(name = %prefixed_name[1..], old_id = ?old, new_id, "relocated item");
	}
	world.blocked.extend(new_blocked.iter().copied());
	world.blocked.sort_unstable();
	world.blocked.dedup();

	Ok(())
}
