use std::{mem, ptr};

use crate::bins::BIN_CAPACITY;

/// Bytes occupied by the header at the front of every block.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Bytes occupied by the boundary tag at the tail of every block.
pub const FOOTER_SIZE: usize = mem::size_of::<usize>();

/// Smallest block the allocator will ever carve: header plus footer, with no
/// payload. Splitting never produces a remainder below this.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + FOOTER_SIZE;

/// Block is on a free list.
const FREE: usize = 0b01;

/// Block is an individually mapped oversized region.
const MAPPED: usize = 0b10;

/// Sizes are word multiples, so the low bits of the tag are spare.
const FLAG_MASK: usize = 0b11;

/// Metadata at the front of every block.
///
/// `tag` packs the total block size (header and footer included) with the
/// flag bits above, and is mirrored in a footer word at the block's tail.
/// The footer is maintained for allocated blocks too: it lives outside the
/// payload, and it is what lets `release` inspect a physical predecessor
/// without walking any list.
///
/// `prev` and `next` are intrusive free-list links, meaningful only while
/// the block is free; while allocated those words are payload.
#[repr(C)]
pub struct Block {
  tag: usize,
  pub prev: *mut Block,
  pub next: *mut Block,
}

impl Block {
  /// Writes a fresh header of `size` bytes (allocated, unmapped) over raw
  /// memory, footer included.
  ///
  /// # Safety
  ///
  /// `block` must point to at least `size` bytes of writable memory, and
  /// `size` must be a word multiple of at least `MIN_BLOCK_SIZE`.
  pub unsafe fn init(
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      ptr::write(
        block,
        Block {
          tag: size,
          prev: ptr::null_mut(),
          next: ptr::null_mut(),
        },
      );
      (*block).write_footer();
    }
  }

  /// Total span of the block in bytes, header and footer included.
  pub fn size(&self) -> usize {
    self.tag & !FLAG_MASK
  }

  pub fn is_free(&self) -> bool {
    self.tag & FREE != 0
  }

  pub fn is_mapped(&self) -> bool {
    self.tag & MAPPED != 0
  }

  /// Resizes the block in place, keeping its flags and moving the footer to
  /// the new tail.
  pub unsafe fn set_size(
    &mut self,
    size: usize,
  ) {
    self.tag = size | (self.tag & FLAG_MASK);
    unsafe { self.write_footer() };
  }

  pub unsafe fn mark_free(&mut self) {
    self.tag |= FREE;
    unsafe { self.write_footer() };
  }

  pub unsafe fn mark_allocated(&mut self) {
    self.tag &= !FREE;
    unsafe { self.write_footer() };
  }

  pub unsafe fn mark_mapped(&mut self) {
    self.tag |= MAPPED;
    unsafe { self.write_footer() };
  }

  /// The pointer handed to the caller: first byte past the header.
  pub fn payload(&mut self) -> *mut u8 {
    unsafe { (self as *mut Block as *mut u8).add(HEADER_SIZE) }
  }

  /// Recovers the header from a pointer previously returned by `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`] on a live block.
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// The block that physically follows this one inside the same chunk, or
  /// null at the chunk's edge.
  ///
  /// Chunks are fully tiled by blocks, so a non-null result always points at
  /// a valid header.
  pub fn phys_next(&self) -> *mut Block {
    let end = self as *const Block as usize + self.size();

    if end >= self.chunk_base() + BIN_CAPACITY {
      return ptr::null_mut();
    }

    end as *mut Block
  }

  /// The block that physically precedes this one inside the same chunk,
  /// located through its footer, or null at the chunk's edge.
  ///
  /// # Safety
  ///
  /// The chunk must be fully tiled by valid blocks, so that the word before
  /// this header is the predecessor's footer.
  pub unsafe fn phys_prev(&self) -> *mut Block {
    let start = self as *const Block as usize;

    if start == self.chunk_base() {
      return ptr::null_mut();
    }

    let prev_tag = unsafe { *((start - FOOTER_SIZE) as *const usize) };
    (start - (prev_tag & !FLAG_MASK)) as *mut Block
  }

  /// Start of the `BIN_CAPACITY`-aligned chunk holding this block. Mappings
  /// are page-aligned and the page size is a multiple of `BIN_CAPACITY`, so
  /// this is pure address arithmetic.
  fn chunk_base(&self) -> usize {
    (self as *const Block as usize) & !(BIN_CAPACITY - 1)
  }

  unsafe fn write_footer(&mut self) {
    unsafe {
      let footer = (self as *mut Block as *mut u8).add(self.size() - FOOTER_SIZE);
      *(footer as *mut usize) = self.tag;
    }
  }
}
