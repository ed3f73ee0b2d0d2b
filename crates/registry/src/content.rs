//! Registered content objects and their identity.
//!
//! # Role
//!
//! Content objects are opaque to the registry: only their kind tag and their
//! pointer identity matter. The kind is a closed variant, so block/item
//! dispatch is an exhaustive match rather than runtime type inspection. A
//! compound item carries the handle of the block it represents and must end
//! up sharing that block's id.

use std::sync::Arc;

use crate::ids::Namespace;

/// Shared handle to a registered content object. Identity is pointer
/// identity: two handles refer to the same object iff they point at the same
/// allocation.
pub type ContentHandle = Arc<Content>;

/// A registrable content object.
#[derive(Debug)]
pub struct Content {
	kind: ContentKind,
}

/// Closed tag distinguishing the registrable object kinds.
#[derive(Clone, Debug)]
pub enum ContentKind {
	Block,
	Item,
	/// Item representation of a block; must share the block's id.
	CompoundItem { block: ContentHandle },
}

impl Content {
	pub fn block() -> ContentHandle {
		Arc::new(Content {
			kind: ContentKind::Block,
		})
	}

	pub fn item() -> ContentHandle {
		Arc::new(Content {
			kind: ContentKind::Item,
		})
	}

	pub fn compound_item(block: ContentHandle) -> ContentHandle {
		Arc::new(Content {
			kind: ContentKind::CompoundItem { block },
		})
	}

	pub fn kind(&self) -> &ContentKind {
		&self.kind
	}

	/// Namespace this object registers into.
	pub fn namespace(&self) -> Namespace {
		match self.kind {
			ContentKind::Block => Namespace::Block,
			ContentKind::Item | ContentKind::CompoundItem { .. } => Namespace::Item,
		}
	}

	/// The paired block for a compound item, `None` otherwise.
	pub fn compound_block(&self) -> Option<&ContentHandle> {
		match &self.kind {
			ContentKind::CompoundItem { block } => Some(block),
			_ => None,
		}
	}
}

/// Returns whether two handles are the same object.
#[inline]
pub fn same(a: &ContentHandle, b: &ContentHandle) -> bool {
	Arc::ptr_eq(a, b)
}

/// Pointer-identity map key for reverse object lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ObjKey(usize);

impl ObjKey {
	pub(crate) fn of(handle: &ContentHandle) -> Self {
		ObjKey(Arc::as_ptr(handle) as usize)
	}
}
