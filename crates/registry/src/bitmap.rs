//! Occupancy bitmap over the combined id space.
//!
//! # Role
//!
//! One bit per id across the whole space, shared by both namespaces. A block
//! and its compound item occupy the same id and therefore the same bit;
//! occupancy is the union of block use, item use, and permanently blocked
//! ids. The bitmap never decides ownership, it only answers "is this slot
//! taken" and "where is the next free slot".

use crate::ids::{ID_SPACE, RawId};

const WORD_BITS: u32 = u64::BITS;
const WORDS: usize = ID_SPACE.div_ceil(WORD_BITS) as usize;

/// Fixed-size occupancy bitmap over ids `0..ID_SPACE`.
#[derive(Clone, PartialEq, Eq)]
pub struct SlotBitmap {
	words: Box<[u64; WORDS]>,
}

impl Default for SlotBitmap {
	fn default() -> Self {
		Self::new()
	}
}

impl SlotBitmap {
	pub fn new() -> Self {
		Self {
			words: Box::new([0; WORDS]),
		}
	}

	#[inline]
	fn index(id: RawId) -> (usize, u64) {
		debug_assert!(id < ID_SPACE, "id {id} outside the combined space");
		((id / WORD_BITS) as usize, 1u64 << (id % WORD_BITS))
	}

	/// Returns whether the slot for `id` is occupied.
	#[inline]
	pub fn is_set(&self, id: RawId) -> bool {
		let (word, mask) = Self::index(id);
		self.words[word] & mask != 0
	}

	/// Marks the slot for `id` occupied.
	#[inline]
	pub fn set(&mut self, id: RawId) {
		let (word, mask) = Self::index(id);
		self.words[word] |= mask;
	}

	/// Marks the slot for `id` free.
	#[inline]
	pub fn clear(&mut self, id: RawId) {
		let (word, mask) = Self::index(id);
		self.words[word] &= !mask;
	}

	/// Smallest free id at or above `start`, or `None` when the combined
	/// space is exhausted.
	pub fn next_clear(&self, start: RawId) -> Option<RawId> {
		if start >= ID_SPACE {
			return None;
		}
		let mut word = (start / WORD_BITS) as usize;
		// Mask off bits below `start` in the first word.
		let mut inverted = !self.words[word] & (!0u64 << (start % WORD_BITS));
		loop {
			if inverted != 0 {
				let id = word as u32 * WORD_BITS + inverted.trailing_zeros();
				return (id < ID_SPACE).then_some(id);
			}
			word += 1;
			if word == WORDS {
				return None;
			}
			inverted = !self.words[word];
		}
	}

	/// Replaces this bitmap's contents with a copy of `other`.
	pub fn copy_from(&mut self, other: &SlotBitmap) {
		self.words.copy_from_slice(&other.words[..]);
	}

	/// Marks every slot occupied in `other` occupied here as well.
	pub fn union_with(&mut self, other: &SlotBitmap) {
		for (word, bits) in self.words.iter_mut().zip(other.words.iter()) {
			*word |= bits;
		}
	}

	/// Iterates every occupied id in ascending order.
	pub fn iter_set(&self) -> impl Iterator<Item = RawId> + '_ {
		self.words.iter().enumerate().flat_map(|(w, &bits)| {
			let base = w as u32 * WORD_BITS;
			(0..WORD_BITS)
				.filter(move |bit| bits & (1u64 << bit) != 0)
				.map(move |bit| base + bit)
				.filter(|&id| id < ID_SPACE)
		})
	}
}

impl std::fmt::Debug for SlotBitmap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let used = self.iter_set().count();
		f.debug_struct("SlotBitmap").field("used", &used).finish()
	}
}
