//! # binalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a **binned allocator**: a dynamic-memory allocator
//! built directly on anonymous `mmap` regions, with no dependency on any
//! pre-existing allocator.
//!
//! ## Overview
//!
//! Free memory is kept in an array of *bins*, one per power-of-two size
//! class; each bin is an address-ordered, intrusive doubly linked list:
//!
//! ```text
//!   Bin Table (size classes):
//!
//!   bin  5 (..=64)    ──▶ ┌──────┐    ┌──────┐
//!                         │ 40 B │ ──▶│ 56 B │
//!                         └──────┘    └──────┘
//!   bin  6 (..=128)   ──▶ (empty)
//!   ...
//!   bin 11 (..=4096)  ──▶ ┌────────┐
//!                         │ 4096 B │
//!                         └────────┘
//!
//!   Each free block carries its metadata inside itself:
//!
//!   ┌────────────────────────┬──────────────────────────────┬────────┐
//!   │  size | FREE | prev,   │        (old payload,         │ size | │
//!   │  next                  │         now list links)      │ FREE   │
//!   └────────────────────────┴──────────────────────────────┴────────┘
//!    header                                                   footer
//! ```
//!
//! Allocation is first-fit: scan bins from the request's size class upward,
//! take the first block that fits, split off the tail if it is big enough to
//! stand alone. Release coalesces with both physical neighbors and files the
//! merged block into its recomputed bin. Neighbors are found by address
//! arithmetic through the footer tags, so merges work even when they sit in
//! different bins.
//!
//! Requests at or above the last bin's capacity get a private mapping and
//! are unmapped directly on release; bin memory itself is never returned to
//! the OS.
//!
//! ## Crate Structure
//!
//! ```text
//!   binalloc
//!   ├── align      - Word-alignment macro (align!)
//!   ├── page       - Anonymous mapping / unmapping, page size query
//!   ├── block      - Block header and boundary tag (internal)
//!   ├── bins       - Size classes and the bin table
//!   └── binned     - BinnedAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use binalloc::BinnedAllocator;
//!
//! fn main() {
//!     let mut allocator = BinnedAllocator::new();
//!
//!     unsafe {
//!         let ptr = allocator.allocate(std::mem::size_of::<u64>()) as *mut u64;
//!
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         allocator.deallocate(ptr as *mut u8);
//!     }
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: the API takes `&mut self`; no locking inside
//! - **No realloc**: growing an allocation means allocate + copy + release
//! - **Natural alignment only**: pointers are word-aligned, nothing more
//! - **No misuse detection**: double frees and foreign pointers are UB
//! - **Unix-only**: requires `libc` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

pub mod align;
mod binned;
mod bins;
mod block;
mod page;

pub use binned::BinnedAllocator;
pub use bins::{BIN_CAPACITY, MAX_BINS, size_class};
pub use page::page_size;
