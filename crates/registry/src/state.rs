//! Paired-namespace registry state.
//!
//! # Role
//!
//! Owns one [`SlotBitmap`], one [`NamespaceRegistry`] per namespace, and the
//! set of permanently blocked ids. All registration goes through here: the
//! namespace registry decides the id, this state marks occupancy, so the
//! cross-namespace slot sharing between a block and its compound item stays
//! in one place. Deep copy (`Clone`/`snapshot`) and in-place replace (`set`)
//! are the freeze/revert building blocks.
//!
//! # Invariants
//!
//! - A bitmap bit is set iff the id is held by a block, held by an item, or
//!   blocked. Proven by [`RegistryState::test_consistency`].
//! - A compound item always holds exactly its block's id, inside the block
//!   range.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bitmap::SlotBitmap;
use crate::content::{ContentHandle, ContentKind, same};
use crate::error::{RegistryError, Result};
use crate::ids::{self, Namespace, RawId};
use crate::namespace::NamespaceRegistry;
use crate::persist::IdTable;

/// Wildcard meta value for block-backed stack descriptors.
pub const WILDCARD_META: u32 = 0x7fff;

/// Auxiliary stack descriptor for the legacy custom-stack lookup path.
#[derive(Clone, Debug)]
pub struct StackDescriptor {
	pub content: ContentHandle,
	pub size: u32,
	pub meta: u32,
}

impl StackDescriptor {
	fn of_item(item: &ContentHandle) -> Self {
		Self {
			content: item.clone(),
			size: 0,
			meta: 0,
		}
	}

	fn of_block(block: &ContentHandle) -> Self {
		Self {
			content: block.clone(),
			size: 0,
			meta: WILDCARD_META,
		}
	}
}

#[derive(Clone)]
pub struct RegistryState {
	bitmap: SlotBitmap,
	blocks: NamespaceRegistry,
	items: NamespaceRegistry,
	/// Ids previously allocated in a world but now dangling; never reused.
	blocked: FxHashSet<RawId>,
	/// Qualified name → registering extension. Attribution only, not part of
	/// the consistency invariants.
	owners: FxHashMap<String, String>,
	/// (owning extension, local name) → stack descriptor. Legacy lookup path.
	custom_stacks: FxHashMap<(String, String), StackDescriptor>,
}

impl Default for RegistryState {
	fn default() -> Self {
		Self::new()
	}
}

impl RegistryState {
	pub fn new() -> Self {
		Self {
			bitmap: SlotBitmap::new(),
			blocks: NamespaceRegistry::new(Namespace::Block),
			items: NamespaceRegistry::new(Namespace::Item),
			blocked: FxHashSet::default(),
			owners: FxHashMap::default(),
			custom_stacks: FxHashMap::default(),
		}
	}

	pub fn blocks(&self) -> &NamespaceRegistry {
		&self.blocks
	}

	pub fn items(&self) -> &NamespaceRegistry {
		&self.items
	}

	pub fn registry(&self, ns: Namespace) -> &NamespaceRegistry {
		match ns {
			Namespace::Block => &self.blocks,
			Namespace::Item => &self.items,
		}
	}

	pub fn registry_mut(&mut self, ns: Namespace) -> &mut NamespaceRegistry {
		match ns {
			Namespace::Block => &mut self.blocks,
			Namespace::Item => &mut self.items,
		}
	}

	pub fn bitmap(&self) -> &SlotBitmap {
		&self.bitmap
	}

	/// Registers `obj` under `name`, dispatching on its kind.
	pub fn register(
		&mut self,
		obj: &ContentHandle,
		name: &str,
		owner: Option<&str>,
		id_hint: Option<RawId>,
	) -> Result<RawId> {
		match obj.kind() {
			ContentKind::Block => self.register_block(obj, name, owner, id_hint),
			ContentKind::Item | ContentKind::CompoundItem { .. } => {
				self.register_item(obj, name, owner, id_hint)
			}
		}
	}

	/// Registers a block.
	///
	/// If a compound item for this exact block is already registered, the
	/// block must take that item's id: the slot is freed under the
	/// [`RegistryState::free_slot`] guard, re-claimed by the block, and
	/// re-marked occupied. Landing anywhere else is fatal.
	pub fn register_block(
		&mut self,
		block: &ContentHandle,
		name: &str,
		owner: Option<&str>,
		id_hint: Option<RawId>,
	) -> Result<RawId> {
		if !matches!(block.kind(), ContentKind::Block) {
			return Err(RegistryError::invalid(format!(
				"{name} is not a block but was routed to block registration"
			)));
		}
		self.record_owner(owner, name);

		// Handle compound-item-before-block registrations.
		let compound = self.items.entries().into_iter().find_map(|(id, obj)| {
			obj.compound_block()
				.filter(|b| same(b, block))
				.map(|_| (id, obj.clone()))
		});

		let id = if let Some((item_id, item)) = compound {
			tracing::debug!(
				id = item_id,
				name,
				hint = ?id_hint,
				"found matching compound item for block"
			);
			// Temporarily free the slot occupied by the item so the block
			// registration can re-claim it.
			self.free_slot(item_id, block)?;
			let id = self.blocks.add(Some(item_id), name, block, &self.bitmap)?;
			if id != item_id {
				return Err(RegistryError::consistency(format!(
					"block {name} landed at {id} instead of its compound item slot {item_id}"
				)));
			}
			self.verify_compound_name(&item);
			id
		} else {
			self.blocks.add(id_hint, name, block, &self.bitmap)?
		};

		self.bitmap.set(id);
		Ok(id)
	}

	/// Registers an item.
	///
	/// A compound item whose block is not yet registered reserves a
	/// block-range slot (replacing an unsuitable hint with the lowest free
	/// block-range id); one whose block is registered must take the block's
	/// id exactly.
	pub fn register_item(
		&mut self,
		item: &ContentHandle,
		name: &str,
		owner: Option<&str>,
		id_hint: Option<RawId>,
	) -> Result<RawId> {
		if matches!(item.kind(), ContentKind::Block) {
			return Err(RegistryError::invalid(format!(
				"{name} is not an item but was routed to item registration"
			)));
		}
		self.record_owner(owner, name);

		let mut hint = id_hint;
		if let Some(block) = item.compound_block().cloned() {
			match self.blocks.id_of(&block) {
				None => {
					// Compound item before its block: the slot must stay
					// block-compatible for the later block registration.
					let id = match hint {
						Some(h) if h <= ids::BLOCK_MAX && !self.bitmap.is_set(h) => h,
						_ => self
							.bitmap
							.next_clear(ids::BLOCK_MIN)
							.filter(|&id| id <= ids::BLOCK_MAX)
							.ok_or(RegistryError::RangeExhausted {
								namespace: Namespace::Block,
							})?,
					};
					tracing::debug!(
						id,
						name,
						hint = ?id_hint,
						"allocated block-range id for compound item before its block"
					);
					hint = Some(id);
				}
				Some(block_id) => {
					tracing::debug!(
						id = block_id,
						name,
						hint = ?id_hint,
						"compound item binds to its registered block"
					);
					// Temporarily free the block's slot for the item add.
					self.free_slot(block_id, item)?;
					hint = Some(block_id);
				}
			}
		}

		let id = self.items.add(hint, name, item, &self.bitmap)?;

		if item.compound_block().is_some() {
			if Some(id) != hint {
				return Err(RegistryError::consistency(format!(
					"compound item {name} landed at {id} instead of the intended slot {hint:?}"
				)));
			}
			self.verify_compound_name(item);
		}

		self.bitmap.set(id);
		Ok(id)
	}

	/// Permanently reserves `id` so dangling persisted references can never
	/// be reassigned to an unrelated object.
	pub fn block(&mut self, id: RawId) {
		self.blocked.insert(id);
		self.bitmap.set(id);
	}

	pub fn is_blocked(&self, id: RawId) -> bool {
		self.blocked.contains(&id)
	}

	/// Blocked ids, ascending.
	pub fn blocked_ids(&self) -> Vec<RawId> {
		let mut out: Vec<_> = self.blocked.iter().copied().collect();
		out.sort_unstable();
		out
	}

	/// Clears the occupancy bit for `id`, but only if the namespace matching
	/// `expected` holds nothing or exactly `expected` there.
	pub fn free_slot(&mut self, id: RawId, expected: &ContentHandle) -> Result<()> {
		let registry = self.registry(expected.namespace());
		if let Some(occupant) = registry.get_raw(id) {
			if !same(occupant, expected) {
				let occupant = format!(
					"{} {}",
					registry.namespace(),
					registry.name_of(occupant).unwrap_or("<unnamed>")
				);
				return Err(RegistryError::SlotConflict { id, occupant });
			}
		}
		self.bitmap.clear(id);
		Ok(())
	}

	fn record_owner(&mut self, owner: Option<&str>, name: &str) {
		if let Some(ext) = owner {
			self.owners.insert(name.to_owned(), ext.to_owned());
		}
	}

	/// Extension recorded as the registrant of `name`.
	pub fn find_owner(&self, name: &str) -> Option<&str> {
		self.owners.get(name).map(String::as_str)
	}

	/// Records a custom stack under the owning extension and a local name.
	pub fn register_custom_stack(&mut self, ext: &str, name: &str, stack: StackDescriptor) {
		self.custom_stacks
			.insert((ext.to_owned(), name.to_owned()), stack);
	}

	/// Custom (extension, local name) pairs, ascending. Feed for the
	/// diagnostic dump.
	pub fn custom_stack_keys(&self) -> Vec<(&str, &str)> {
		let mut out: Vec<_> = self
			.custom_stacks
			.keys()
			.map(|(ext, name)| (ext.as_str(), name.as_str()))
			.collect();
		out.sort_unstable();
		out
	}

	/// Legacy stack lookup: custom stack table first, then the item under
	/// `ext:name`, then the block under `ext:name` with wildcard meta.
	pub fn find_stack(&self, ext: &str, name: &str) -> Option<StackDescriptor> {
		if let Some(stack) = self.custom_stacks.get(&(ext.to_owned(), name.to_owned())) {
			return Some(stack.clone());
		}
		let qualified = format!("{ext}:{name}");
		if let Some(item) = self.items.get_by_name(&qualified) {
			return Some(StackDescriptor::of_item(item));
		}
		self.blocks
			.get_by_name(&qualified)
			.map(StackDescriptor::of_block)
	}

	/// Registered name of `obj`, unless a custom stack shadows it.
	pub fn unique_name_of(&self, obj: &ContentHandle) -> Option<&str> {
		let name = self.registry(obj.namespace()).name_of(obj)?;
		let (ext, local) = name.split_once(':')?;
		if self
			.custom_stacks
			.contains_key(&(ext.to_owned(), local.to_owned()))
		{
			return None;
		}
		Some(name)
	}

	fn verify_compound_name(&self, item: &ContentHandle) {
		let Some(block) = item.compound_block() else {
			return;
		};
		if let (Some(block_name), Some(item_name)) =
			(self.blocks.name_of(block), self.items.name_of(item))
			&& block_name != item_name
		{
			tracing::warn!(
				block = %block_name,
				item = %item_name,
				"block and compound item registered under different names"
			);
		}
	}

	/// Exports every populated (prefixed name, id) pair of both namespaces.
	pub fn serialize_into(&self, table: &mut IdTable) {
		self.blocks.serialize_into(table);
		self.items.serialize_into(table);
	}

	/// Full invariant sweep over the maps, the bitmap, and the blocked set.
	///
	/// Diagnostic and defensive: called after bulk mutation, never on the
	/// hot path. Any violation is a non-recoverable internal error.
	pub fn test_consistency(&self) -> Result<()> {
		for id in self.bitmap.iter_set() {
			if self.blocks.get_raw(id).is_none()
				&& self.items.get_raw(id).is_none()
				&& !self.blocked.contains(&id)
			{
				return Err(RegistryError::consistency(format!(
					"occupancy bit set for empty id {id}"
				)));
			}
		}

		for registry in [&self.blocks, &self.items] {
			let ns = registry.namespace();
			for (id, obj) in registry.entries() {
				if obj.namespace() != ns {
					return Err(RegistryError::consistency(format!(
						"{} entry at id {id} is a {} object",
						ns,
						obj.namespace()
					)));
				}
				let Some(name) = registry.name_of(obj) else {
					return Err(RegistryError::consistency(format!(
						"{ns} entry at id {id} yields no name"
					)));
				};
				if registry.id_of(obj) != Some(id) {
					return Err(RegistryError::consistency(format!(
						"{ns} {name} at id {id} yields a different id"
					)));
				}
				if id > ns.max_id() {
					return Err(RegistryError::consistency(format!(
						"{ns} {name} uses id {id} above the namespace max"
					)));
				}
				match registry.get_by_name(name) {
					Some(o) if same(o, obj) => {}
					_ => {
						return Err(RegistryError::consistency(format!(
							"{ns} name {name} does not yield the object at id {id}"
						)));
					}
				}
				if registry.id_of_name(name) != Some(id) {
					return Err(RegistryError::consistency(format!(
						"{ns} name {name} does not yield id {id}"
					)));
				}
				if !self.bitmap.is_set(id) {
					return Err(RegistryError::consistency(format!(
						"{ns} {name} at id {id} is marked as empty"
					)));
				}
				if self.blocked.contains(&id) {
					return Err(RegistryError::consistency(format!(
						"{ns} {name} at id {id} is marked as dangling"
					)));
				}
				if let Some(block) = obj.compound_block() {
					if self.blocks.id_of(block) != Some(id) {
						return Err(RegistryError::consistency(format!(
							"compound item {name} at id {id} does not match its block's id {:?}",
							self.blocks.id_of(block)
						)));
					}
					if id > ids::BLOCK_MAX {
						return Err(RegistryError::consistency(format!(
							"compound item {name} uses id {id} outside the block range"
						)));
					}
				}
			}
		}

		tracing::debug!("registry consistency check successful");
		Ok(())
	}

	/// Deep copy. Content handles are shared; all maps are copied.
	pub fn snapshot(&self) -> RegistryState {
		self.clone()
	}

	/// Replaces all internal state with a deep copy of `other`.
	pub fn set(&mut self, other: &RegistryState) {
		self.bitmap.copy_from(&other.bitmap);
		self.blocks.set(&other.blocks);
		self.items.set(&other.items);
		self.blocked = other.blocked.clone();
		self.owners = other.owners.clone();
		self.custom_stacks = other.custom_stacks.clone();
	}
}

impl std::fmt::Debug for RegistryState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistryState")
			.field("blocks", &self.blocks.len())
			.field("items", &self.items.len())
			.field("blocked", &self.blocked.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::content::Content;
	use crate::ids::{ITEM_MIN, prefixed};

	/// Blocks and items allocate from their own range minimum.
	#[test]
	fn fresh_allocation_per_namespace() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stick = Content::item();
		assert_eq!(state.register(&stone, "a:stone", None, None).unwrap(), 0);
		assert_eq!(
			state.register(&stick, "a:stick", None, None).unwrap(),
			ITEM_MIN
		);
		state.test_consistency().unwrap();
	}

	/// A compound item registered after its block takes the block's id, and
	/// both namespaces resolve that id.
	#[test]
	fn compound_after_block_shares_id() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stone_item = Content::compound_item(stone.clone());
		let id = state.register(&stone, "a:stone", None, None).unwrap();
		let item_id = state
			.register(&stone_item, "a:stone", None, Some(9000))
			.unwrap();
		assert_eq!(id, item_id);
		assert!(same(state.blocks().get_raw(id).unwrap(), &stone));
		assert!(same(state.items().get_raw(id).unwrap(), &stone_item));
		assert!(state.bitmap().is_set(id));
		state.test_consistency().unwrap();
	}

	/// A compound item registered before its block reserves a block-range
	/// slot; the later block registration joins it there.
	#[test]
	fn compound_before_block_shares_id() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stone_item = Content::compound_item(stone.clone());
		let item_id = state
			.register(&stone_item, "a:stone", None, None)
			.unwrap();
		assert!(item_id <= ids::BLOCK_MAX, "compound item must reserve a block-range slot");
		let block_id = state.register(&stone, "a:stone", None, None).unwrap();
		assert_eq!(block_id, item_id);
		state.test_consistency().unwrap();
	}

	/// Final state is independent of compound/block registration order.
	#[test]
	fn compound_registration_order_independence() {
		let build = |block_first: bool| {
			let mut state = RegistryState::new();
			let stone = Content::block();
			let stone_item = Content::compound_item(stone.clone());
			if block_first {
				state.register(&stone, "a:stone", None, None).unwrap();
				state.register(&stone_item, "a:stone", None, None).unwrap();
			} else {
				state.register(&stone_item, "a:stone", None, None).unwrap();
				state.register(&stone, "a:stone", None, None).unwrap();
			}
			state.test_consistency().unwrap();
			let mut table = IdTable::default();
			state.serialize_into(&mut table);
			table
		};
		assert_eq!(build(true), build(false));
	}

	/// An unsuitable hint for a compound-before-block registration is
	/// replaced with a block-range slot, not an item-range one.
	#[test]
	fn compound_hint_outside_block_range_is_replaced() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stone_item = Content::compound_item(stone.clone());
		let id = state
			.register(&stone_item, "a:stone", None, Some(ITEM_MIN + 5))
			.unwrap();
		assert!(id <= ids::BLOCK_MAX);
	}

	/// free_slot refuses to clear a slot owned by an unrelated object.
	#[test]
	fn free_slot_guards_unrelated_occupants() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let dirt = Content::block();
		let id = state.register(&stone, "a:stone", None, None).unwrap();
		state.register(&dirt, "a:dirt", None, None).unwrap();

		let err = state.free_slot(id, &dirt).unwrap_err();
		assert!(matches!(err, RegistryError::SlotConflict { .. }));
		// The same object (or the other namespace) may free it.
		state.free_slot(id, &stone).unwrap();
		state.bitmap.set(id); // restore for the sweep
		state.test_consistency().unwrap();
	}

	/// Blocked ids are never handed out again.
	#[test]
	fn blocked_ids_are_not_reallocated() {
		let mut state = RegistryState::new();
		state.block(0);
		state.block(1);
		let stone = Content::block();
		let id = state.register(&stone, "a:stone", None, Some(0)).unwrap();
		assert_eq!(id, 2, "hint pointing at a blocked id must be ignored");
		assert_eq!(state.blocked_ids(), vec![0, 1]);
		state.test_consistency().unwrap();
	}

	/// Kind/path mismatches are rejected.
	#[test]
	fn kind_mismatch_is_invalid() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stick = Content::item();
		assert!(matches!(
			state.register_item(&stone, "a:stone", None, None),
			Err(RegistryError::InvalidArgument { .. })
		));
		assert!(matches!(
			state.register_block(&stick, "a:stick", None, None),
			Err(RegistryError::InvalidArgument { .. })
		));
	}

	/// Consistency holds after any sequence of individually successful
	/// register/block/free operations.
	#[test]
	fn consistency_after_mixed_mutations() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stone_item = Content::compound_item(stone.clone());
		let stick = Content::item();
		state.register(&stone_item, "a:stone", None, None).unwrap();
		state.register(&stone, "a:stone", None, None).unwrap();
		state.register(&stick, "a:stick", None, None).unwrap();
		state.block(77);
		state.block(ITEM_MIN + 100);
		state.test_consistency().unwrap();
	}

	/// snapshot/set round-trips the full state.
	#[test]
	fn snapshot_set_round_trip() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		state.register(&stone, "a:stone", None, None).unwrap();
		state.block(40);
		let frozen = state.snapshot();

		let dirt = Content::block();
		state.register(&dirt, "a:dirt", None, None).unwrap();
		assert!(state.blocks().contains_name("a:dirt"));

		state.set(&frozen);
		assert!(!state.blocks().contains_name("a:dirt"));
		assert_eq!(state.blocks().id_of_name("a:stone"), Some(0));
		assert!(state.is_blocked(40));
		assert_eq!(state.bitmap(), frozen.bitmap());
		state.test_consistency().unwrap();
	}

	/// The custom stack table shadows unique names and feeds find_stack.
	#[test]
	fn custom_stack_lookup_chain() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		let stick = Content::item();
		state.register(&stone, "a:stone", Some("a"), None).unwrap();
		state.register(&stick, "a:stick", Some("a"), None).unwrap();
		assert_eq!(state.find_owner("a:stone"), Some("a"));

		// Fallback chain: item first, then block with wildcard meta.
		let stack = state.find_stack("a", "stick").unwrap();
		assert!(same(&stack.content, &stick));
		let stack = state.find_stack("a", "stone").unwrap();
		assert!(same(&stack.content, &stone));
		assert_eq!(stack.meta, WILDCARD_META);
		assert!(state.find_stack("a", "gone").is_none());

		// A registered custom stack wins and shadows the unique name.
		assert_eq!(state.unique_name_of(&stick), Some("a:stick"));
		let custom = StackDescriptor {
			content: stone.clone(),
			size: 1,
			meta: 3,
		};
		state.register_custom_stack("a", "stick", custom);
		let stack = state.find_stack("a", "stick").unwrap();
		assert_eq!(stack.meta, 3);
		assert_eq!(state.unique_name_of(&stick), None);
	}
}
