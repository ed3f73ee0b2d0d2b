//! Registry error taxonomy.
//!
//! # Role
//!
//! Every fatal failure mode of allocation, slot management, and consistency
//! checking is a distinct variant. Allocation and slot errors during normal
//! registration halt startup; during world reconciliation every error except
//! an unresolved mapping (which flows through the resolver callback, not
//! through this type) aborts the load and leaves the committed state
//! untouched.

use crate::ids::{Namespace, RawId};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	/// No free id left within a namespace's range. Too much registered
	/// content; unrecoverable at startup.
	#[error("no free id left in the {namespace} range")]
	RangeExhausted { namespace: Namespace },

	/// A slot operation found an unexpected live occupant. Internal bug or
	/// severely corrupted persisted state; never silently overwritten.
	#[error("registry slot {id} is occupied by {occupant}")]
	SlotConflict { id: RawId, occupant: String },

	/// Registration input that cannot be acted on. Programmer error.
	#[error("invalid registration: {reason}")]
	InvalidArgument { reason: String },

	/// The name/id/object maps and the occupancy bitmap contradict each
	/// other. Indicates a bug upstream; must abort rather than persist.
	#[error("registry consistency violation: {detail}")]
	Consistency { detail: String },

	/// The user declined a destructive-operation confirmation.
	#[error("load aborted")]
	LoadAborted,

	/// The world backup could not be created; the in-memory state is left
	/// unchanged.
	#[error("world backup failed")]
	BackupFailed(#[from] std::io::Error),
}

impl RegistryError {
	pub(crate) fn consistency(detail: impl Into<String>) -> Self {
		RegistryError::Consistency {
			detail: detail.into(),
		}
	}

	pub(crate) fn invalid(reason: impl Into<String>) -> Self {
		RegistryError::InvalidArgument {
			reason: reason.into(),
		}
	}
}

pub type Result<T> = std::result::Result<T, RegistryError>;
