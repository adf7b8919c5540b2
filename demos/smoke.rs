use std::io::Read;

use binalloc::{BIN_CAPACITY, BinnedAllocator};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just watch the mappings grow.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  // One independent arena; nothing global.
  let mut allocator = BinnedAllocator::new();

  unsafe {
    println!("[0] PID = {}, bins start empty:", std::process::id());
    allocator.print_bins();
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 56 bytes. The first request maps a page, carves the
    //    block from its front and files the remainder as a free block.
    // --------------------------------------------------------------------
    let blah = allocator.allocate(56);
    println!("\n[1] Allocated 56 bytes at {:?}", blah);
    allocator.print_bins();

    // Write something into the allocated memory to show it's usable.
    blah.write_bytes(0xAA, 56);
    println!("[1] Filled with 0xAA, first byte = 0x{:X}", *blah);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 10 bytes. This is carved from the remainder, right
    //    behind the first block.
    // --------------------------------------------------------------------
    let blah2 = allocator.allocate(10);
    println!("\n[2] Allocated 10 bytes at {:?}", blah2);
    allocator.print_bins();
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Release both. Watch the bins: the two blocks and the tail
    //    remainder merge back into one full-sized free block.
    // --------------------------------------------------------------------
    allocator.deallocate(blah);
    println!("\n[3] Released the 56-byte block:");
    allocator.print_bins();

    allocator.deallocate(blah2);
    println!("\n[3] Released the 10-byte block (everything coalesced):");
    allocator.print_bins();
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate 56 bytes again. First-fit over address-ordered lists
    //    hands back the same address as in step 1.
    // --------------------------------------------------------------------
    let again = allocator.allocate(56);
    println!("\n[4] Allocated 56 bytes again at {:?}", again);
    println!(
      "[4] again == blah? {}",
      if again == blah {
        "Yes, it reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate past the last bin's capacity. This bypasses the bins
    //    entirely and gets a mapping of its own.
    // --------------------------------------------------------------------
    let big = allocator.allocate(BIN_CAPACITY * 4);
    println!("\n[5] Allocated {} bytes (oversized) at {:?}", BIN_CAPACITY * 4, big);
    println!("[5] Bins are untouched:");
    allocator.print_bins();

    big.write_bytes(0xBB, BIN_CAPACITY * 4);
    println!("[5] Oversized block is writable, last byte = 0x{:X}", *big.add(BIN_CAPACITY * 4 - 1));
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Release the oversized block: it is unmapped on the spot, not
    //    filed into any bin.
    // --------------------------------------------------------------------
    allocator.deallocate(big);
    println!("\n[6] Released the oversized block (munmap):");
    allocator.print_bins();

    // --------------------------------------------------------------------
    // 7) End of demo. Remaining bin pages are abandoned; the OS reclaims
    //    every mapping when the process exits.
    // --------------------------------------------------------------------
    allocator.deallocate(again);
    println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
