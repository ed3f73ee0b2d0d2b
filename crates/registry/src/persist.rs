//! Persisted id table and diagnostic exports.
//!
//! # Role
//!
//! The save pipeline hands the registry one flat mapping from
//! sentinel-prefixed qualified name to id; both namespaces multiplex into it
//! (see [`crate::ids`] for the codec). Insertion order is preserved so the
//! reconciliation passes iterate persisted entries deterministically.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::ids::RawId;
use crate::state::RegistryState;

/// Persisted mapping from sentinel-prefixed qualified name to id.
pub type IdTable = IndexMap<String, RawId>;

/// Everything the registry persists with a world: the id table, the blocked
/// ids, and the legacy-name aliases of both namespaces.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistedWorld {
	pub table: IdTable,
	pub blocked: Vec<RawId>,
	pub block_aliases: IndexMap<String, String>,
	pub item_aliases: IndexMap<String, String>,
}

impl PersistedWorld {
	/// Captures the live side of `state` as a persisted world.
	pub fn capture(state: &RegistryState) -> Self {
		let mut world = PersistedWorld::default();
		state.serialize_into(&mut world.table);
		world.blocked = state.blocked_ids();
		for registry in [state.blocks(), state.items()] {
			let aliases = match registry.namespace() {
				crate::ids::Namespace::Block => &mut world.block_aliases,
				crate::ids::Namespace::Item => &mut world.item_aliases,
			};
			for (old, new) in registry.aliases() {
				aliases.insert(old.to_owned(), new.to_owned());
			}
		}
		world
	}
}

/// Environment flag gating the custom-stack CSV dump.
pub const DUMP_FLAG: &str = "LOAM_DUMP_REGISTRY";

fn dump_enabled() -> bool {
	matches!(std::env::var(DUMP_FLAG), Ok(v) if v == "1" || v == "true")
}

/// Writes a CSV of `owner_extension,local_name` pairs for every custom
/// registered stack, one per line, UTF-8. Opt-in via [`DUMP_FLAG`]; returns
/// the written path, or `None` when the flag is unset.
pub fn dump_registry(dir: &Path, state: &RegistryState) -> std::io::Result<Option<PathBuf>> {
	if !dump_enabled() {
		return Ok(None);
	}
	let path = dir.join("custom_stack_registry.csv");
	let mut out = Vec::new();
	for (ext, name) in state.custom_stack_keys() {
		writeln!(&mut out, "{ext},{name}")?;
	}
	match std::fs::write(&path, out) {
		Ok(()) => {
			tracing::info!(path = %path.display(), "dumped custom stack registry");
			Ok(Some(path))
		}
		Err(e) => {
			tracing::error!(path = %path.display(), error = %e, "failed to write registry dump");
			Err(e)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::content::Content;
	use crate::ids::{Namespace, prefixed};
	use crate::state::StackDescriptor;

	/// Both namespaces serialize into one table, tagged by sentinel.
	#[test]
	fn table_multiplexes_namespaces() {
		let mut state = RegistryState::new();
		state
			.register(&Content::block(), "a:stone", None, None)
			.unwrap();
		state
			.register(&Content::item(), "a:stick", None, None)
			.unwrap();
		let mut table = IdTable::default();
		state.serialize_into(&mut table);
		assert_eq!(table.len(), 2);
		assert_eq!(table[&prefixed(Namespace::Block, "a:stone")], 0);
		assert_eq!(table[&prefixed(Namespace::Item, "a:stick")], 4096);
	}

	/// The CSV dump is opt-in and row-per-stack.
	#[test]
	fn dump_respects_flag() {
		let mut state = RegistryState::new();
		let stone = Content::block();
		state.register(&stone, "a:stone", None, None).unwrap();
		state.register_custom_stack(
			"a",
			"pebble",
			StackDescriptor {
				content: stone.clone(),
				size: 1,
				meta: 0,
			},
		);

		let dir = std::env::temp_dir().join("loam-registry-dump-test");
		std::fs::create_dir_all(&dir).unwrap();

		// SAFETY: test-local env mutation; no threads race this flag here.
		unsafe { std::env::remove_var(DUMP_FLAG) };
		assert_eq!(dump_registry(&dir, &state).unwrap(), None);

		unsafe { std::env::set_var(DUMP_FLAG, "true") };
		let path = dump_registry(&dir, &state).unwrap().expect("dump written");
		let body = std::fs::read_to_string(&path).unwrap();
		assert_eq!(body, "a,pebble\n");
		unsafe { std::env::remove_var(DUMP_FLAG) };
	}
}
