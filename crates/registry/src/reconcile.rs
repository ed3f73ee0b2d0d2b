//! World-load id reconciliation.
//!
//! # Role
//!
//! Maps a persisted id table onto the live registry: a fresh candidate state
//! is built with the persisted ids as authoritative, id drift between the
//! live registration and the persisted world is recorded in a remap table,
//! unresolved names are routed through the extension system's resolver, and
//! only a candidate that passes the full consistency sweep is committed —
//! atomically, as a whole. Any failure or abort leaves the committed state
//! untouched.
//!
//! The sequence runs Start → BlockPass → ItemPass → MissingNameResolution →
//! (InjectFrozen) → ConsistencyVerified → Committed; blocks strictly before
//! items so compound items bind against blocks already present in the
//! candidate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::hooks::{LoadGate, MappingResolver, MissingAction, MissingMapping, WorldBackup};
use crate::hub::RegistryHub;
use crate::ids::{self, Namespace, RawId};
use crate::persist::PersistedWorld;
use crate::state::RegistryState;

/// One id change produced by reconciliation: the entry named `name` moved
/// from `old_id` (this run's registration) to `new_id` (committed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
	pub namespace: Namespace,
	pub name: String,
	pub old_id: RawId,
	pub new_id: RawId,
}

/// Accumulated id changes, keyed per namespace and name. Later records for
/// the same key replace earlier ones.
#[derive(Clone, Debug, Default)]
pub struct RemapTable {
	entries: IndexMap<(Namespace, String), (RawId, RawId)>,
}

impl RemapTable {
	pub fn record(&mut self, ns: Namespace, name: impl Into<String>, old_id: RawId, new_id: RawId) {
		self.entries.insert((ns, name.into()), (old_id, new_id));
	}

	pub fn get(&self, ns: Namespace, name: &str) -> Option<(RawId, RawId)> {
		self.entries.get(&(ns, name.to_owned())).copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = RemapEntry> + '_ {
		self.entries
			.iter()
			.map(|((ns, name), &(old_id, new_id))| RemapEntry {
				namespace: *ns,
				name: name.clone(),
				old_id,
				new_id,
			})
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Result of a reconciliation attempt that did not error out.
#[derive(Debug)]
pub enum ReconcileOutcome {
	/// The candidate was committed; the table describes every changed id.
	Committed(RemapTable),
	/// A fail-class missing mapping rejected the world. Nothing changed.
	Rejected { unresolved: Vec<String> },
}

/// World-load reconciliation driver.
pub struct WorldReconciler<'a, R, G, B>
where
	R: MappingResolver,
	G: LoadGate,
	B: WorldBackup,
{
	hub: &'a RegistryHub,
	resolver: &'a R,
	gate: &'a G,
	backup: &'a B,
}

impl<'a, R, G, B> WorldReconciler<'a, R, G, B>
where
	R: MappingResolver,
	G: LoadGate,
	B: WorldBackup,
{
	pub fn new(hub: &'a RegistryHub, resolver: &'a R, gate: &'a G, backup: &'a B) -> Self {
		Self {
			hub,
			resolver,
			gate,
			backup,
		}
	}

	/// Reconciles a persisted world against the live registry and, on
	/// success, atomically replaces the live state.
	///
	/// With `inject_frozen`, content present in the frozen reference state
	/// but unknown to the persisted world (extensions added since the save)
	/// is registered into the candidate as well.
	pub fn reconcile(
		&self,
		world: &PersistedWorld,
		inject_frozen: bool,
		is_local_world: bool,
	) -> Result<ReconcileOutcome> {
		tracing::info!(local = is_local_world, entries = world.table.len(), "injecting persisted block and item ids");
		let live = self.hub.live();
		live.test_consistency()?;
		live.blocks().dump();
		live.items().dump();

		let mut candidate = RegistryState::new();
		let mut remaps = RemapTable::default();
		let mut missing: Vec<MissingMapping> = Vec::new();

		for &id in &world.blocked {
			candidate.block(id);
		}
		for (old, new) in &world.block_aliases {
			candidate.registry_mut(Namespace::Block).add_alias(old, new);
		}
		for (old, new) in &world.item_aliases {
			candidate.registry_mut(Namespace::Item).add_alias(old, new);
		}

		// Blocks strictly before items.
		for ns in [Namespace::Block, Namespace::Item] {
			for (prefixed_name, &persisted_id) in &world.table {
				let Some((entry_ns, name)) = ids::split_prefixed(prefixed_name) else {
					return Err(RegistryError::invalid(format!(
						"persisted name {prefixed_name:?} has no namespace sentinel"
					)));
				};
				if entry_ns != ns {
					continue;
				}

				let registry = live.registry(ns);
				let Some(obj) = registry.get_by_name(name) else {
					tracing::info!(namespace = %ns, name, "persisted name missing from the live registry");
					missing.push(MissingMapping::new(ns, name.to_owned(), persisted_id));
					continue;
				};
				let Some(live_id) = registry.id_of_name(name) else {
					return Err(RegistryError::consistency(format!(
						"live {ns} {name} has an object but no id"
					)));
				};
				if live_id != persisted_id {
					tracing::debug!(
						namespace = %ns,
						name,
						live_id,
						persisted_id,
						"persisted id differs from this run's registration"
					);
					remaps.record(ns, name, live_id, persisted_id);
				}

				// The persisted id is authoritative for the candidate.
				let obj = obj.clone();
				let landed = candidate.register(&obj, name, None, Some(persisted_id))?;
				if landed != persisted_id {
					return Err(RegistryError::SlotConflict {
						id: persisted_id,
						occupant: slot_occupant(&candidate, ns, persisted_id),
					});
				}
			}
		}

		if !missing.is_empty() {
			self.resolver
				.resolve_missing(&mut missing, is_local_world, &candidate, &remaps);
		}
		let unresolved = self.process_rematches(&live, &mut candidate, missing, &mut remaps)?;
		if !unresolved.is_empty() {
			return Ok(ReconcileOutcome::Rejected { unresolved });
		}

		if inject_frozen {
			let Some(frozen) = self.hub.frozen() else {
				return Err(RegistryError::invalid(
					"cannot inject frozen data: the registry was never frozen",
				));
			};
			self.inject_frozen_entries(&frozen, &mut candidate, &mut remaps)?;
		}

		candidate.test_consistency()?;
		self.hub.commit(candidate);
		let committed = self.hub.live();
		committed.blocks().dump();
		committed.items().dump();
		self.resolver.remap_notify(&remaps);
		Ok(ReconcileOutcome::Committed(remaps))
	}

	/// Applies missing-mapping dispositions onto the candidate. Returns the
	/// names whose fail-class disposition rejects the world.
	fn process_rematches(
		&self,
		live: &RegistryState,
		candidate: &mut RegistryState,
		decisions: Vec<MissingMapping>,
		remaps: &mut RemapTable,
	) -> Result<Vec<String>> {
		let mut failed = Vec::new();
		let mut warned = Vec::new();
		let mut defaulted = Vec::new();
		let mut ignored = 0usize;

		for entry in decisions {
			match entry.action {
				MissingAction::Remap(ref target) => {
					let ns = entry.namespace;
					let registry = live.registry(ns);
					let Some(new_name) = registry.name_of(target) else {
						return Err(RegistryError::invalid(format!(
							"substitute for {ns} {} is not registered in the live registry",
							entry.name
						)));
					};
					let new_name = new_name.to_owned();
					let live_id = registry.id_of(target);
					tracing::debug!(
						namespace = %ns,
						old = %entry.name,
						new = %new_name,
						"remapping persisted name to a substitute"
					);

					let target = target.clone();
					let landed = match ns {
						Namespace::Block => {
							candidate.register_block(&target, &new_name, None, Some(entry.id))?
						}
						Namespace::Item => {
							candidate.register_item(&target, &new_name, None, Some(entry.id))?
						}
					};
					candidate
						.registry_mut(ns)
						.add_alias(entry.name.clone(), new_name.clone());
					if landed != entry.id {
						return Err(RegistryError::consistency(format!(
							"substitute for {ns} {} landed at {landed} instead of persisted id {}",
							entry.name, entry.id
						)));
					}
					if live_id != Some(landed) {
						tracing::info!(
							namespace = %ns,
							name = %new_name,
							live_id = ?live_id,
							persisted_id = landed,
							"substituted entry keeps the persisted id"
						);
						if let Some(old) = live_id {
							remaps.record(ns, new_name, old, landed);
						}
					}
				}
				ref action => match action {
					// The content is gone but accepted as lost; its id must
					// never be reused.
					MissingAction::Default => {
						defaulted.push(entry.name.clone());
						candidate.block(entry.id);
					}
					MissingAction::Warn => {
						warned.push(entry.name.clone());
						candidate.block(entry.id);
					}
					MissingAction::Ignore => ignored += 1,
					MissingAction::Fail => failed.push(entry.name.clone()),
					MissingAction::Remap(_) => unreachable!(),
				},
			}
		}

		if !defaulted.is_empty() {
			let mut text = format!(
				"This save references {} blocks/items that are missing from the \
				 installed extensions.\nIf you continue the missing entries will be \
				 removed. A world backup will be created first.\n\nMissing entries:\n",
				defaulted.len()
			);
			for name in &defaulted {
				text.push_str(name);
				text.push('\n');
			}
			if !self.gate.confirm(&text) {
				return Err(RegistryError::LoadAborted);
			}
			if let Err(e) = self.backup.backup_world() {
				self.gate
					.notify(&format!("The world backup could not be created.\n\n{e}"));
				return Err(RegistryError::BackupFailed(e));
			}
			warned.extend(defaulted);
		}

		if !failed.is_empty() {
			tracing::error!(
				count = failed.len(),
				"this world contains blocks and items that refuse to be remapped; the world will not be loaded"
			);
			return Ok(failed);
		}
		if !warned.is_empty() {
			tracing::error!(
				count = warned.len(),
				"this world contains block and item mappings that may cause world breakage"
			);
		} else if ignored > 0 {
			tracing::debug!(count = ignored, "missing mappings ignored");
		}
		Ok(Vec::new())
	}

	/// Registers frozen-state entries the candidate does not know, blocks
	/// first, using the frozen id as a hint.
	fn inject_frozen_entries(
		&self,
		frozen: &RegistryState,
		candidate: &mut RegistryState,
		remaps: &mut RemapTable,
	) -> Result<()> {
		let missing_blocks = frozen.blocks().entries_not_in(candidate.blocks());
		let missing_items = frozen.items().entries_not_in(candidate.items());
		if missing_blocks.is_empty() && missing_items.is_empty() {
			return Ok(());
		}
		tracing::info!(
			blocks = missing_blocks.len(),
			items = missing_items.len(),
			"injecting extension content unknown to the persisted world"
		);

		for (ns, entries) in [
			(Namespace::Block, missing_blocks),
			(Namespace::Item, missing_items),
		] {
			for (name, frozen_id) in entries {
				let Some(obj) = frozen.registry(ns).get_by_name(&name) else {
					return Err(RegistryError::consistency(format!(
						"frozen {ns} {name} vanished between diff and injection"
					)));
				};
				let obj = obj.clone();
				let landed = match ns {
					Namespace::Block => {
						candidate.register_block(&obj, &name, None, Some(frozen_id))?
					}
					Namespace::Item => {
						candidate.register_item(&obj, &name, None, Some(frozen_id))?
					}
				};
				tracing::info!(namespace = %ns, name = %name, frozen_id, landed, "injected new entry");
				if landed != frozen_id {
					remaps.record(ns, name, frozen_id, landed);
				}
			}
		}
		Ok(())
	}
}

fn slot_occupant(state: &RegistryState, ns: Namespace, id: RawId) -> String {
	let registry = state.registry(ns);
	if let Some(obj) = registry.get_raw(id) {
		return format!(
			"{} {}",
			ns,
			registry.name_of(obj).unwrap_or("<unnamed>")
		);
	}
	if state.is_blocked(id) {
		return format!("blocked id {id}");
	}
	format!("slot {id} in the other namespace")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remap_table_replaces_per_key() {
		let mut remaps = RemapTable::default();
		remaps.record(Namespace::Block, "a:stone", 0, 5);
		remaps.record(Namespace::Item, "a:stone", 4096, 4100);
		remaps.record(Namespace::Block, "a:stone", 0, 9);

		assert_eq!(remaps.len(), 2, "block and item keys are distinct");
		assert_eq!(remaps.get(Namespace::Block, "a:stone"), Some((0, 9)));
		assert_eq!(remaps.get(Namespace::Item, "a:stone"), Some((4096, 4100)));
		let entries: Vec<_> = remaps.iter().collect();
		assert_eq!(entries[0].namespace, Namespace::Block);
		assert_eq!(entries[0].new_id, 9);
	}
}
