//! Per-namespace name/id/object registry.
//!
//! # Role
//!
//! One instance per namespace (blocks, items). Owns the bidirectional
//! name↔id↔object maps and the legacy-name alias table, and decides which id
//! a new entry gets. It does not own occupancy: the shared [`SlotBitmap`] is
//! consulted for allocation but marked by the owning state, so a block and
//! its compound item can share one slot across the two namespaces.
//!
//! # Invariants
//!
//! - For every populated id `i`: `by_id[i]`, `by_name[name_of(by_id[i])]`,
//!   and the reverse maps all agree (bijection both directions).
//! - Every populated id is at most the namespace max. The min only seeds
//!   allocation; compound items in the item namespace sit below it.

use rustc_hash::FxHashMap;

use crate::bitmap::SlotBitmap;
use crate::content::{ContentHandle, ObjKey, same};
use crate::error::{RegistryError, Result};
use crate::ids::{self, Namespace, RawId};
use crate::persist::IdTable;

#[derive(Clone)]
pub struct NamespaceRegistry {
	ns: Namespace,
	by_id: FxHashMap<RawId, ContentHandle>,
	by_name: FxHashMap<String, ContentHandle>,
	id_of_obj: FxHashMap<ObjKey, RawId>,
	name_of_obj: FxHashMap<ObjKey, String>,
	/// Legacy-name redirects, consulted on name lookup only. Never mutates ids.
	aliases: FxHashMap<String, String>,
}

impl NamespaceRegistry {
	pub fn new(ns: Namespace) -> Self {
		Self {
			ns,
			by_id: FxHashMap::default(),
			by_name: FxHashMap::default(),
			id_of_obj: FxHashMap::default(),
			name_of_obj: FxHashMap::default(),
			aliases: FxHashMap::default(),
		}
	}

	pub fn namespace(&self) -> Namespace {
		self.ns
	}

	/// Registers `obj` under `name`, deciding its id.
	///
	/// The `id_hint` is used when it is free per `bitmap` and not above the
	/// namespace max; otherwise the lowest free id from the namespace min is
	/// taken. The caller marks the bitmap bit afterwards.
	///
	/// Re-adding the identical (name, object) pair is idempotent and returns
	/// the existing id.
	pub fn add(
		&mut self,
		id_hint: Option<RawId>,
		name: &str,
		obj: &ContentHandle,
		bitmap: &SlotBitmap,
	) -> Result<RawId> {
		ids::validate_name(name).map_err(RegistryError::invalid)?;

		if let Some(existing) = self.by_name.get(name) {
			if same(existing, obj) {
				return Ok(self.id_of_obj[&ObjKey::of(obj)]);
			}
			let id = self.id_of_obj[&ObjKey::of(existing)];
			return Err(RegistryError::SlotConflict {
				id,
				occupant: format!("{} {name}", self.ns),
			});
		}
		if let Some(&id) = self.id_of_obj.get(&ObjKey::of(obj)) {
			let taken = &self.name_of_obj[&ObjKey::of(obj)];
			return Err(RegistryError::invalid(format!(
				"object already registered as {} {taken} (id {id}), refusing second name {name}",
				self.ns
			)));
		}

		let id = match id_hint {
			Some(id) if id <= self.ns.max_id() && !bitmap.is_set(id) => id,
			_ => bitmap
				.next_clear(self.ns.min_id())
				.filter(|&id| id <= self.ns.max_id())
				.ok_or(RegistryError::RangeExhausted { namespace: self.ns })?,
		};

		self.by_id.insert(id, obj.clone());
		self.by_name.insert(name.to_owned(), obj.clone());
		self.id_of_obj.insert(ObjKey::of(obj), id);
		self.name_of_obj.insert(ObjKey::of(obj), name.to_owned());
		Ok(id)
	}

	/// Id registered for `name`, following the alias table when the direct
	/// match fails.
	pub fn id_of_name(&self, name: &str) -> Option<RawId> {
		self.get_by_name(name)
			.map(|obj| self.id_of_obj[&ObjKey::of(obj)])
	}

	/// Id registered for `obj`.
	pub fn id_of(&self, obj: &ContentHandle) -> Option<RawId> {
		self.id_of_obj.get(&ObjKey::of(obj)).copied()
	}

	/// Object at `id`.
	pub fn get_raw(&self, id: RawId) -> Option<&ContentHandle> {
		self.by_id.get(&id)
	}

	/// Object registered under `name`, following the alias table when the
	/// direct match fails.
	pub fn get_by_name(&self, name: &str) -> Option<&ContentHandle> {
		self.by_name.get(name).or_else(|| {
			let canonical = self.aliases.get(name)?;
			self.by_name.get(canonical)
		})
	}

	pub fn contains_name(&self, name: &str) -> bool {
		self.get_by_name(name).is_some()
	}

	/// Registered name of `obj`.
	pub fn name_of(&self, obj: &ContentHandle) -> Option<&str> {
		self.name_of_obj.get(&ObjKey::of(obj)).map(String::as_str)
	}

	/// Records a legacy-name redirect for lookup.
	pub fn add_alias(&mut self, old: impl Into<String>, new: impl Into<String>) {
		self.aliases.insert(old.into(), new.into());
	}

	pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
		self.aliases.iter().map(|(o, n)| (o.as_str(), n.as_str()))
	}

	/// Every (id, object) pair, ascending by id.
	pub fn entries(&self) -> Vec<(RawId, &ContentHandle)> {
		let mut out: Vec<_> = self.by_id.iter().map(|(&id, obj)| (id, obj)).collect();
		out.sort_by_key(|&(id, _)| id);
		out
	}

	/// Every (name, id) pair present here but absent from `other`, by name,
	/// ascending by id. Used to inject extension content a persisted world
	/// predates.
	pub fn entries_not_in(&self, other: &NamespaceRegistry) -> Vec<(String, RawId)> {
		let mut out: Vec<_> = self
			.by_name
			.iter()
			.filter(|(name, _)| !other.by_name.contains_key(*name))
			.map(|(name, obj)| (name.clone(), self.id_of_obj[&ObjKey::of(obj)]))
			.collect();
		out.sort_by_key(|&(_, id)| id);
		out
	}

	/// Exports every populated (prefixed name, id) pair into `table`.
	pub fn serialize_into(&self, table: &mut IdTable) {
		for (id, obj) in self.entries() {
			let name = &self.name_of_obj[&ObjKey::of(obj)];
			table.insert(ids::prefixed(self.ns, name), id);
		}
	}

	/// Replaces all internal state with a deep copy of `other`.
	pub fn set(&mut self, other: &NamespaceRegistry) {
		self.ns = other.ns;
		self.by_id = other.by_id.clone();
		self.by_name = other.by_name.clone();
		self.id_of_obj = other.id_of_obj.clone();
		self.name_of_obj = other.name_of_obj.clone();
		self.aliases = other.aliases.clone();
	}

	/// Emits the current name→id table at debug level.
	pub fn dump(&self) {
		tracing::debug!(namespace = %self.ns, entries = self.by_id.len(), "registry dump");
		for (id, obj) in self.entries() {
			let name = &self.name_of_obj[&ObjKey::of(obj)];
			tracing::debug!(namespace = %self.ns, id, name = %name, "registry entry");
		}
	}

	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}
}

impl std::fmt::Debug for NamespaceRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NamespaceRegistry")
			.field("ns", &self.ns)
			.field("entries", &self.by_id.len())
			.field("aliases", &self.aliases.len())
			.finish()
	}
}
