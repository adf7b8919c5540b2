/// Rounds the given size up to the next multiple of the machine word.
///
/// Every block the allocator hands out is sized through this macro, so user
/// pointers always carry natural pointer alignment.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use binalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    (($value) + mem::size_of::<usize>() - 1) & !(mem::size_of::<usize>() - 1)
  };
}
