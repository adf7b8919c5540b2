use std::{mem, ptr};

use crate::{
  align,
  bins::{BIN_CAPACITY, BinTable, MAX_BINS},
  block::{Block, FOOTER_SIZE, HEADER_SIZE, MIN_BLOCK_SIZE},
  page,
};

/// A segregated free-list allocator working directly on anonymous mappings.
///
/// Each instance owns an independent arena: its bin table is the only state,
/// so tests and callers can run as many allocators side by side as they
/// like. The API is single-threaded by construction (`&mut self`); callers
/// that share an instance across threads must bring their own lock.
///
/// Memory mapped for the bins is never returned to the OS; oversized
/// allocations get their own mapping and are unmapped on release.
pub struct BinnedAllocator {
  bins: BinTable,
}

impl BinnedAllocator {
  pub fn new() -> Self {
    Self {
      bins: BinTable::new(),
    }
  }

  /// Allocates `size` bytes and returns a word-aligned pointer to them, or
  /// null when `size` is zero or the OS refuses to map more memory.
  ///
  /// # Safety
  ///
  /// The returned pointer is raw: the caller must not touch more than `size`
  /// bytes behind it, and must release it exactly once via [`deallocate`]
  /// (or leak it).
  ///
  /// [`deallocate`]: BinnedAllocator::deallocate
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    // Half the address space is already more than any mapping can hold;
    // beyond it the header and page arithmetic below would wrap.
    if size > usize::MAX / 2 {
      return ptr::null_mut();
    }

    let request_size = align!(size + HEADER_SIZE + FOOTER_SIZE);

    // Too big for the last bin: give it a mapping of its own.
    if request_size >= BIN_CAPACITY {
      return Self::allocate_mapped(request_size);
    }

    let mut block = self.bins.find_fit(request_size);

    if block.is_null() {
      if !self.grow() {
        return ptr::null_mut();
      }
      // A fresh chunk satisfies any binned request.
      block = self.bins.find_fit(request_size);
    }

    unsafe {
      self.bins.remove(block);
      // Clear the FREE flag before splitting: the remainder goes back in
      // through the coalescing path, which must not absorb the block being
      // handed out.
      (*block).mark_allocated();
      self.split(block, request_size);
      (*block).payload()
    }
  }

  /// Releases a pointer previously returned by [`allocate`]. A null pointer
  /// is a no-op; oversized blocks are unmapped on the spot, everything else
  /// is coalesced back into its bin.
  ///
  /// # Safety
  ///
  /// `address` must be null or a pointer obtained from this instance's
  /// [`allocate`] that has not been released yet. Double frees and foreign
  /// pointers are undefined behavior; the allocator does not detect them.
  ///
  /// [`allocate`]: BinnedAllocator::allocate
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(address);

      if (*block).is_mapped() {
        page::unmap(block as *mut u8, (*block).size());
        return;
      }

      self.bins.insert(block);
    }
  }

  /// Calls `visit` with the address and size of every free block in `bin`,
  /// lowest address first. Diagnostic surface only; the contract of the
  /// allocator is `allocate`/`deallocate`.
  pub fn for_each_free_block(
    &self,
    bin: usize,
    visit: impl FnMut(*const u8, usize),
  ) {
    self.bins.for_each_free_block(bin, visit);
  }

  /// Dumps every bin's free blocks to stdout.
  pub fn print_bins(&self) {
    for bin in 0..MAX_BINS {
      print!("bin {:2} (..={:4}):", bin, 1usize << (bin + 1));
      self.bins.for_each_free_block(bin, |addr, size| {
        print!(" {:?}/{}", addr, size);
      });
      println!();
    }
  }

  fn allocate_mapped(request_size: usize) -> *mut u8 {
    let mapped_size = page::round_to_page(request_size);
    let region = page::map(mapped_size);

    if region.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      let block = region as *mut Block;
      Block::init(block, mapped_size);
      (*block).mark_mapped();
      (*block).payload()
    }
  }

  /// Maps one more page run and carves it into `BIN_CAPACITY`-sized chunks,
  /// each inserted as a single free block. Chunks are the coalescing unit:
  /// merges never cross their edges, so no free block ever outgrows the
  /// last bin.
  fn grow(&mut self) -> bool {
    let len = page::round_to_page(BIN_CAPACITY);
    let region = page::map(len);

    if region.is_null() {
      return false;
    }

    unsafe {
      let mut offset = 0;

      while offset < len {
        let chunk = region.add(offset) as *mut Block;
        Block::init(chunk, BIN_CAPACITY);
        self.bins.insert(chunk);
        offset += BIN_CAPACITY;
      }
    }

    true
  }

  /// Shrinks `block` to exactly `request_size` bytes and frees the cut-off
  /// tail, unless the tail would be too small to carry its own header.
  unsafe fn split(
    &mut self,
    block: *mut Block,
    request_size: usize,
  ) {
    unsafe {
      let excess = (*block).size() - request_size;

      if excess < MIN_BLOCK_SIZE {
        return;
      }

      (*block).set_size(request_size);

      let rest = (*block).phys_next();
      Block::init(rest, excess);
      self.bins.insert(rest);
    }
  }
}

impl Default for BinnedAllocator {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bins::size_class;

  /// Checks the two list invariants on every bin: strictly ascending
  /// addresses, and every block sized for exactly the bin it sits in.
  fn assert_bins_wellformed(allocator: &BinnedAllocator) {
    for bin in 0..MAX_BINS {
      let mut last_addr = 0;

      allocator.for_each_free_block(bin, |addr, size| {
        assert!(addr as usize > last_addr, "bin {} not address-ordered", bin);
        last_addr = addr as usize;

        assert_eq!(bin, size_class(size), "size {} in wrong bin {}", size, bin);
        assert_eq!(0, size % mem::size_of::<usize>());
        assert!(size >= MIN_BLOCK_SIZE);
        assert!(size <= BIN_CAPACITY);
      });
    }
  }

  fn total_free_bytes(allocator: &BinnedAllocator) -> usize {
    let mut total = 0;
    for bin in 0..MAX_BINS {
      allocator.for_each_free_block(bin, |_, size| total += size);
    }
    total
  }

  #[test]
  fn test_zero_size_returns_null() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      assert!(allocator.allocate(0).is_null());
    }

    assert_eq!(0, total_free_bytes(&allocator));
  }

  #[test]
  fn test_huge_request_returns_null() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      // Sizes whose block arithmetic would wrap must fail cleanly, not
      // come back as a tiny block.
      assert!(allocator.allocate(usize::MAX).is_null());
      assert!(allocator.allocate(usize::MAX - HEADER_SIZE - FOOTER_SIZE).is_null());
    }

    assert_eq!(0, total_free_bytes(&allocator));
  }

  #[test]
  fn test_allocation_is_usable_and_aligned() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      let first = allocator.allocate(mem::size_of::<u64>()) as *mut u64;
      assert!(!first.is_null());
      assert_eq!(0, first as usize % mem::size_of::<usize>());

      *first = 3;
      assert_eq!(3, *first);

      let count = 6;
      let second = allocator.allocate(count * mem::size_of::<u16>()) as *mut u16;

      for i in 0..count {
        *second.add(i) = (i + 1) as u16;
      }

      // The first allocation survived the second one.
      assert_eq!(3, *first);
      for i in 0..count {
        assert_eq!((i + 1) as u16, *second.add(i));
      }

      assert_bins_wellformed(&allocator);
    }
  }

  #[test]
  fn test_allocation_is_off_the_free_lists() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      // Splitting a fresh chunk files the remainder right behind the
      // returned block; the block itself must be gone from every list.
      let addr = allocator.allocate(8);
      let block = Block::from_payload(addr);
      let start = block as usize;
      let end = start + (*block).size();

      for bin in 0..MAX_BINS {
        allocator.for_each_free_block(bin, |free, size| {
          let free_start = free as usize;
          let free_end = free_start + size;
          let disjoint = end <= free_start || free_end <= start;
          assert!(
            disjoint,
            "allocated block [{:#x}; {:#x}) overlaps free block [{:#x}; {:#x})",
            start, end, free_start, free_end
          );
        });
      }

      allocator.deallocate(addr);
    }
  }

  #[test]
  fn test_round_trip_reuses_block() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      let first = allocator.allocate(300);
      let before = total_free_bytes(&allocator);

      allocator.deallocate(first);

      let second = allocator.allocate(300);
      assert_eq!(first, second);

      // Reuse, not growth.
      assert_eq!(before, total_free_bytes(&allocator));
    }
  }

  #[test]
  fn test_live_allocations_do_not_overlap() {
    let mut allocator = BinnedAllocator::new();
    let sizes = [1, 8, 24, 56, 100, 500, 1000, 2000, 3000, 16, 56];
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    unsafe {
      for &size in &sizes {
        let addr = allocator.allocate(size);
        assert!(!addr.is_null());

        // Fill the whole allocation; neighbors' metadata must survive.
        addr.write_bytes(0xCD, size);

        ranges.push((addr as usize, size));
        assert_bins_wellformed(&allocator);
      }

      for (i, &(start, size)) in ranges.iter().enumerate() {
        for &(other_start, other_size) in &ranges[i + 1..] {
          let disjoint = start + size <= other_start || other_start + other_size <= start;
          assert!(disjoint, "[{:#x}; {}] overlaps [{:#x}; {}]", start, size, other_start, other_size);
        }
      }

      for &(start, _) in &ranges {
        allocator.deallocate(start as *mut u8);
        assert_bins_wellformed(&allocator);
      }
    }
  }

  #[test]
  fn test_adjacent_releases_coalesce() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      let first = allocator.allocate(100); // block of 136 bytes
      let second = allocator.allocate(200); // block of 232 bytes
      let _wall = allocator.allocate(50); // keeps the tail remainder away

      // Carved front to back, so the blocks are physical neighbors.
      assert_eq!(first.add(136), second);

      allocator.deallocate(first);
      allocator.deallocate(second);
      assert_bins_wellformed(&allocator);

      // 136 + 232 = 368 bytes merged; minus header and footer that serves
      // a 336-byte request, at the first block's address, with no growth.
      let merged = allocator.allocate(336);
      assert_eq!(first, merged);
    }
  }

  #[test]
  fn test_first_fit_returns_lowest_freed_address() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      let blah = allocator.allocate(56);
      let blah2 = allocator.allocate(10);

      allocator.deallocate(blah);
      allocator.deallocate(blah2);

      // Everything merged back; the next fit starts at the front again.
      let reused = allocator.allocate(56);
      assert_eq!(blah, reused);
    }
  }

  #[test]
  fn test_oversized_bypasses_bins() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      let addr = allocator.allocate(BIN_CAPACITY);
      assert!(!addr.is_null());

      // Dedicated mapping, nothing carved into the bins.
      assert_eq!(0, total_free_bytes(&allocator));

      let block = Block::from_payload(addr);
      assert!((*block).is_mapped());
      assert_eq!(
        page::round_to_page(align!(BIN_CAPACITY + HEADER_SIZE + FOOTER_SIZE)),
        (*block).size()
      );

      addr.write_bytes(0xEF, BIN_CAPACITY);

      allocator.deallocate(addr);
      assert_eq!(0, total_free_bytes(&allocator));
    }
  }

  #[test]
  fn test_largest_binned_request_stays_binned() {
    let mut allocator = BinnedAllocator::new();

    unsafe {
      // Aligned block size of exactly BIN_CAPACITY - word: the largest
      // request the bins still serve.
      let size = BIN_CAPACITY - HEADER_SIZE - FOOTER_SIZE - mem::size_of::<usize>();
      let addr = allocator.allocate(size);

      let block = Block::from_payload(addr);
      assert!(!(*block).is_mapped());

      allocator.deallocate(addr);

      // The whole chunk is free again.
      let mut chunks = 0;
      allocator.for_each_free_block(MAX_BINS - 1, |_, size| {
        assert_eq!(BIN_CAPACITY, size);
        chunks += 1;
      });
      assert!(chunks >= 1);
      assert_bins_wellformed(&allocator);
    }
  }

  #[test]
  fn test_mixed_workload_keeps_invariants() {
    let mut allocator = BinnedAllocator::new();
    let mut live: Vec<(*mut u8, usize)> = Vec::new();
    let mut seed: u64 = 0x2545F4914F6CDD1D;

    unsafe {
      for round in 0..400 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let size = (seed >> 33) as usize % 900 + 1;

        if round % 3 == 2 && !live.is_empty() {
          let victim = (seed >> 17) as usize % live.len();
          let (addr, _) = live.swap_remove(victim);
          allocator.deallocate(addr);
        } else {
          let addr = allocator.allocate(size);
          assert!(!addr.is_null());
          addr.write_bytes(round as u8, size);
          live.push((addr, size));
        }

        assert_bins_wellformed(&allocator);
      }

      for (addr, _) in live.drain(..) {
        allocator.deallocate(addr);
        assert_bins_wellformed(&allocator);
      }

      // With nothing live, every chunk has merged back to full size.
      for bin in 0..MAX_BINS - 1 {
        allocator.for_each_free_block(bin, |_, _| panic!("bin {} should be empty", bin));
      }
      allocator.for_each_free_block(MAX_BINS - 1, |_, size| {
        assert_eq!(BIN_CAPACITY, size);
      });
    }
  }
}
