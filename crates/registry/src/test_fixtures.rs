//! Shared fixtures for the scenario tests: scripted external capabilities
//! and a pre-populated hub.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;

use crate::content::{Content, ContentHandle};
use crate::hooks::{
	ExtensionHost, LoadGate, MappingResolver, MissingAction, MissingMapping, WorldBackup,
};
use crate::hub::RegistryHub;
use crate::ids::Namespace;
use crate::reconcile::{RemapEntry, RemapTable};
use crate::state::RegistryState;

/// Gate that records every prompt and answers all of them the same way.
pub(crate) struct AutoGate {
	pub accept: bool,
	pub confirmations: RefCell<Vec<String>>,
	pub notices: RefCell<Vec<String>>,
}

impl AutoGate {
	pub fn accepting() -> Self {
		Self {
			accept: true,
			confirmations: RefCell::new(Vec::new()),
			notices: RefCell::new(Vec::new()),
		}
	}

	pub fn declining() -> Self {
		Self {
			accept: false,
			..Self::accepting()
		}
	}
}

impl LoadGate for AutoGate {
	fn confirm(&self, message: &str) -> bool {
		self.confirmations.borrow_mut().push(message.to_owned());
		self.accept
	}

	fn notify(&self, message: &str) {
		self.notices.borrow_mut().push(message.to_owned());
	}
}

/// Backup that counts calls and optionally fails.
pub(crate) struct MockBackup {
	pub fail: bool,
	pub calls: Cell<usize>,
}

impl MockBackup {
	pub fn working() -> Self {
		Self {
			fail: false,
			calls: Cell::new(0),
		}
	}

	pub fn failing() -> Self {
		Self {
			fail: true,
			calls: Cell::new(0),
		}
	}
}

impl WorldBackup for MockBackup {
	fn backup_world(&self) -> std::io::Result<()> {
		self.calls.set(self.calls.get() + 1);
		if self.fail {
			Err(std::io::Error::other("disk full"))
		} else {
			Ok(())
		}
	}
}

/// Host with a fixed set of loaded extensions.
pub(crate) struct StaticHost {
	pub loaded: Vec<String>,
}

impl StaticHost {
	pub fn with(loaded: &[&str]) -> Self {
		Self {
			loaded: loaded.iter().map(|s| (*s).to_owned()).collect(),
		}
	}
}

impl ExtensionHost for StaticHost {
	fn is_loaded(&self, ext: &str) -> bool {
		self.loaded.iter().any(|e| e == ext)
	}

	fn active_extension(&self) -> Option<String> {
		self.loaded.first().cloned()
	}
}

/// Resolver with per-name scripted dispositions; untouched entries keep the
/// default action.
pub(crate) struct ScriptedResolver {
	actions: RefCell<FxHashMap<(Namespace, String), MissingAction>>,
	pub seen: RefCell<Vec<String>>,
	pub notified: RefCell<Vec<RemapEntry>>,
}

impl ScriptedResolver {
	pub fn new() -> Self {
		Self {
			actions: RefCell::new(FxHashMap::default()),
			seen: RefCell::new(Vec::new()),
			notified: RefCell::new(Vec::new()),
		}
	}

	pub fn script(&self, ns: Namespace, name: &str, action: MissingAction) {
		self.actions
			.borrow_mut()
			.insert((ns, name.to_owned()), action);
	}
}

impl MappingResolver for ScriptedResolver {
	fn resolve_missing(
		&self,
		missing: &mut [MissingMapping],
		_is_local_world: bool,
		_candidate: &RegistryState,
		_remaps: &RemapTable,
	) {
		for entry in missing {
			self.seen.borrow_mut().push(entry.name.clone());
			if let Some(action) = self
				.actions
				.borrow()
				.get(&(entry.namespace, entry.name.clone()))
			{
				entry.action = action.clone();
			}
		}
	}

	fn remap_notify(&self, remaps: &RemapTable) {
		self.notified.borrow_mut().extend(remaps.iter());
	}
}

/// Hub with a stone block, its compound item, and a stick item, frozen.
pub(crate) struct WorldFixture {
	pub hub: RegistryHub,
	pub stone: ContentHandle,
	pub stone_item: ContentHandle,
	pub stick: ContentHandle,
}

pub(crate) fn basic_hub() -> WorldFixture {
	let hub = RegistryHub::new();
	let stone = Content::block();
	let stone_item = Content::compound_item(stone.clone());
	let stick = Content::item();
	{
		let (stone, stone_item, stick) = (stone.clone(), stone_item.clone(), stick.clone());
		hub.edit(move |state| {
			state.register(&stone, "a:stone", Some("a"), None)?;
			state.register(&stone_item, "a:stone", Some("a"), None)?;
			state.register(&stick, "a:stick", Some("a"), None)?;
			Ok(())
		})
		.unwrap();
	}
	hub.freeze().unwrap();
	WorldFixture {
		hub,
		stone,
		stone_item,
		stick,
	}
}
