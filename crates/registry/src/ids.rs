//! Identifier space layout and the persisted-name codec.
//!
//! # Role
//!
//! One integer range, split into two fixed sub-ranges, backs both content
//! namespaces. Blocks live in the low range, items in the high range; a
//! compound item (the inventory form of a block) is the sole exception and
//! shares its block's low-range id.
//!
//! Persisted id tables multiplex both namespaces into one mapping by tagging
//! every qualified name with a sentinel first byte that is never valid inside
//! a real name.

use serde::{Deserialize, Serialize};

/// Raw numeric content id within the combined space.
pub type RawId = u32;

/// Lowest block id.
pub const BLOCK_MIN: RawId = 0;
/// Highest block id.
pub const BLOCK_MAX: RawId = 4095;
/// Lowest item id.
pub const ITEM_MIN: RawId = 4096;
/// Highest item id.
pub const ITEM_MAX: RawId = 31999;
/// Total number of ids in the combined space.
pub const ID_SPACE: u32 = ITEM_MAX + 1;

/// Sentinel prefix byte tagging block names in a persisted id table.
pub const BLOCK_SENTINEL: char = '\u{1}';
/// Sentinel prefix byte tagging item names in a persisted id table.
pub const ITEM_SENTINEL: char = '\u{2}';

/// The two content namespaces sharing the combined id space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
	Block,
	Item,
}

impl Namespace {
	/// Lowest id allocation starts from in this namespace.
	pub const fn min_id(self) -> RawId {
		match self {
			Namespace::Block => BLOCK_MIN,
			Namespace::Item => ITEM_MIN,
		}
	}

	/// Highest id an entry of this namespace may hold.
	///
	/// The lower bound is an allocation start, not a validity bound: compound
	/// items legitimately sit below [`ITEM_MIN`].
	pub const fn max_id(self) -> RawId {
		match self {
			Namespace::Block => BLOCK_MAX,
			Namespace::Item => ITEM_MAX,
		}
	}

	/// Sentinel byte used for this namespace in persisted tables.
	pub const fn sentinel(self) -> char {
		match self {
			Namespace::Block => BLOCK_SENTINEL,
			Namespace::Item => ITEM_SENTINEL,
		}
	}

	pub const fn label(self) -> &'static str {
		match self {
			Namespace::Block => "block",
			Namespace::Item => "item",
		}
	}
}

impl std::fmt::Display for Namespace {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.label())
	}
}

/// Tags a qualified name with the namespace sentinel for persisted storage.
pub fn prefixed(ns: Namespace, name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 1);
	out.push(ns.sentinel());
	out.push_str(name);
	out
}

/// Splits a persisted prefixed name back into namespace and qualified name.
///
/// Returns `None` for names without a recognized sentinel byte.
pub fn split_prefixed(prefixed: &str) -> Option<(Namespace, &str)> {
	let mut chars = prefixed.chars();
	let ns = match chars.next()? {
		BLOCK_SENTINEL => Namespace::Block,
		ITEM_SENTINEL => Namespace::Item,
		_ => return None,
	};
	Some((ns, chars.as_str()))
}

/// Checks that a qualified name is `namespace:path` shaped and free of
/// sentinel bytes.
pub fn validate_name(name: &str) -> Result<(), String> {
	if name.contains(BLOCK_SENTINEL) || name.contains(ITEM_SENTINEL) {
		return Err(format!("name {name:?} contains a reserved sentinel byte"));
	}
	match name.split_once(':') {
		Some((ext, path)) if !ext.is_empty() && !path.is_empty() => Ok(()),
		_ => Err(format!("name {name:?} is not a qualified `extension:path` name")),
	}
}

/// Extension part of a qualified `extension:path` name.
pub fn extension_of(name: &str) -> Option<&str> {
	name.split_once(':').map(|(ext, _)| ext)
}
