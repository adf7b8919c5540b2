use std::ptr;

use crate::block::Block;

/// Number of size classes.
pub const MAX_BINS: usize = 12;

/// Upper size bound of the last bin, `2^MAX_BINS`. Requests whose total
/// block size reaches this threshold bypass the bins and get their own
/// mapping; it is also the chunk granularity every binned block lives in.
pub const BIN_CAPACITY: usize = 1 << MAX_BINS;

/// Maps a block size to its bin: bin `i` is the unique bin whose range
/// `(2^i, 2^(i+1)]` contains `n`.
///
/// Callers reject sizes of `BIN_CAPACITY` and above before indexing; this
/// function only answers "which bin", not "does it fit".
pub fn size_class(n: usize) -> usize {
  if n <= 2 {
    return 0;
  }

  (n - 1).ilog2() as usize
}

/// Segregated free lists, one address-ordered doubly linked list per size
/// class. Links are intrusive: they live inside the freed blocks themselves.
///
/// Two invariants hold after every operation:
/// - each free block sits on exactly the list `size_class(size)` points at;
/// - every list is strictly ascending by address.
pub struct BinTable {
  heads: [*mut Block; MAX_BINS],
}

impl BinTable {
  pub fn new() -> Self {
    Self {
      heads: [ptr::null_mut(); MAX_BINS],
    }
  }

  /// Frees `block` into its bin.
  ///
  /// Free physical neighbors are absorbed first, each unlinked from its own
  /// bin through its links, so merges across bin boundaries work. The merged
  /// block is then spliced into the list for its recomputed size class, at
  /// its address-ordered position.
  ///
  /// # Safety
  ///
  /// `block` must be a valid, unreachable-from-any-list block whose chunk is
  /// tiled by valid blocks.
  pub unsafe fn insert(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let mut block = block;

      let next = (*block).phys_next();
      if !next.is_null() && (*next).is_free() {
        self.remove(next);
        let merged = (*block).size() + (*next).size();
        (*block).set_size(merged);
      }

      let prev = (*block).phys_prev();
      if !prev.is_null() && (*prev).is_free() {
        self.remove(prev);
        let merged = (*prev).size() + (*block).size();
        block = prev;
        (*block).set_size(merged);
      }

      (*block).mark_free();

      let bin = size_class((*block).size());
      let mut after: *mut Block = self.heads[bin];
      let mut before: *mut Block = ptr::null_mut();

      while !after.is_null() && after < block {
        before = after;
        after = (*after).next;
      }

      (*block).prev = before;
      (*block).next = after;

      if before.is_null() {
        self.heads[bin] = block;
      } else {
        (*before).next = block;
      }

      if !after.is_null() {
        (*after).prev = block;
      }
    }
  }

  /// Unlinks a free block from its bin in O(1).
  ///
  /// # Safety
  ///
  /// `block` must currently be on one of this table's lists.
  pub unsafe fn remove(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let before = (*block).prev;
      let after = (*block).next;

      if before.is_null() {
        self.heads[size_class((*block).size())] = after;
      } else {
        (*before).next = after;
      }

      if !after.is_null() {
        (*after).prev = before;
      }
    }
  }

  /// First-fit lookup: scans bins from `size_class(size)` upward, each list
  /// in address order, and returns the first block of at least `size` bytes.
  /// Null when nothing fits.
  pub fn find_fit(
    &self,
    size: usize,
  ) -> *mut Block {
    for bin in size_class(size)..MAX_BINS {
      let mut current = self.heads[bin];

      while !current.is_null() {
        unsafe {
          if (*current).size() >= size {
            return current;
          }
          current = (*current).next;
        }
      }
    }

    ptr::null_mut()
  }

  /// Calls `visit` with the address and size of every free block in `bin`,
  /// in list (ascending address) order.
  pub fn for_each_free_block(
    &self,
    bin: usize,
    mut visit: impl FnMut(*const u8, usize),
  ) {
    let mut current = self.heads[bin];

    while !current.is_null() {
      unsafe {
        visit(current as *const u8, (*current).size());
        current = (*current).next;
      }
    }
  }
}
