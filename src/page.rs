use std::{ptr, sync::LazyLock};

use libc::{
  __errno_location, EACCES, EAGAIN, EBADF, EINVAL, ENFILE, ENOMEM, MAP_ANONYMOUS, MAP_FAILED,
  MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap,
};

static PAGE_SIZE: LazyLock<usize> = LazyLock::new(page_size::get);

/// The OS page size, queried once and cached.
pub fn page_size() -> usize {
  *PAGE_SIZE
}

/// Rounds `n` up to a whole number of OS pages.
pub fn round_to_page(n: usize) -> usize {
  let mask = page_size() - 1;
  (n + mask) & !mask
}

/// Maps an anonymous, private, read/write region of `round_to_page(len)`
/// bytes. The region is page-aligned and zero-filled by the OS. Returns null
/// if the mapping fails; the caller decides how to surface that.
pub fn map(len: usize) -> *mut u8 {
  let len = round_to_page(len);

  let addr = unsafe {
    mmap(
      ptr::null_mut(),
      len,
      PROT_READ | PROT_WRITE,
      MAP_ANONYMOUS | MAP_PRIVATE,
      -1,
      0,
    )
  };

  if addr == MAP_FAILED {
    return ptr::null_mut();
  }

  addr as *mut u8
}

/// Returns `len` bytes starting at `addr` to the OS.
///
/// A failing `munmap` would silently leak address space while every list
/// invariant still looks intact, so it is treated as fatal.
///
/// # Safety
///
/// `addr` must be the start of a region obtained from [`map`] and `len` its
/// mapped length; no pointer into the region may be used afterwards.
pub unsafe fn unmap(
  addr: *mut u8,
  len: usize,
) {
  let rc = unsafe { munmap(addr as *mut c_void, len) };

  if rc != 0 {
    panic!(
      "munmap({:?}, {}) failed, errno = {}",
      addr,
      len,
      match unsafe { *__errno_location() } {
        EINVAL => "EINVAL",
        ENOMEM => "ENOMEM",
        EACCES => "EACCES",
        EAGAIN => "EAGAIN",
        EBADF => "EBADF",
        ENFILE => "ENFILE",
        _ => "unknown",
      }
    );
  }
}
