//! Error taxonomy and the process-wide handler registry.
//!
//! Every fallible operation in this crate returns a [`Result<T, AllocatorError>`].
//! Before the error is handed back to the caller, the matching registered
//! handler runs: it gets first look, logs or aborts as it sees fit, and
//! then (unless it aborted) the error still propagates. The handler
//! slots themselves are the only shared
//! mutable state the core touches; they live behind `AtomicUsize` so
//! swapping one is a single atomic exchange with no locking.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identifies an allocator instance for logging and handler callbacks.
///
/// `name` is a `'static` string naming the allocator type (e.g.
/// `"rallocator::pool"`); `instance` is an opaque address used only for
/// equality between two [`AllocatorInfo`] values, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorInfo {
  pub name: &'static str,
  pub instance: *const (),
}

impl AllocatorInfo {
  pub fn new(name: &'static str, instance: *const ()) -> Self {
    Self { name, instance }
  }
}

impl fmt::Display for AllocatorInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} @ {:?}", self.name, self.instance)
  }
}

// SAFETY: the instance pointer is never dereferenced, only compared and
// logged, so sending it across threads (as part of passing an error out of
// an allocator call) is sound.
unsafe impl Send for AllocatorInfo {}
unsafe impl Sync for AllocatorInfo {}

/// The kind of allocation size/alignment that was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
  Node,
  Array,
  Alignment,
}

impl fmt::Display for SizeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      SizeKind::Node => "node",
      SizeKind::Array => "array",
      SizeKind::Alignment => "alignment",
    };
    f.write_str(s)
  }
}

/// The full error taxonomy of §7: size/alignment rejection, out-of-memory
/// (elastic and fixed), invalid pointer, double free, buffer overflow and
/// leak.
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
  /// A growable provider could not satisfy a block request.
  #[error("{info}: out of memory requesting {requested} bytes")]
  OutOfMemory { info: AllocatorInfo, requested: usize },

  /// A fixed-capacity provider (static buffer, one-shot) is exhausted.
  #[error("{info}: out of fixed memory requesting {requested} bytes")]
  OutOfFixedMemory { info: AllocatorInfo, requested: usize },

  /// `size`/`count`/`alignment` exceeded what this allocator supports.
  #[error("{info}: bad {kind} size: requested {passed}, supported up to {supported}")]
  BadAllocationSize {
    info: AllocatorInfo,
    kind: SizeKind,
    passed: usize,
    supported: usize,
  },

  /// Deallocation received a pointer the allocator does not own.
  #[error("{info}: invalid pointer {ptr:?}")]
  InvalidPointer { info: AllocatorInfo, ptr: *const u8 },

  /// The same pointer was deallocated twice.
  #[error("{info}: double free of {ptr:?}")]
  DoubleFree { info: AllocatorInfo, ptr: *const u8 },

  /// A fence region was found corrupted at deallocation time.
  #[error("{info}: buffer overflow detected at {ptr:?}")]
  BufferOverflow { info: AllocatorInfo, ptr: *const u8 },
}

// SAFETY: the raw pointers in these variants are only ever compared and
// logged by handlers, never dereferenced by the error type itself.
unsafe impl Send for AllocatorError {}
unsafe impl Sync for AllocatorError {}

impl AllocatorError {
  pub fn bad_node_size(info: AllocatorInfo, passed: usize, supported: usize) -> Self {
    Self::BadAllocationSize { info, kind: SizeKind::Node, passed, supported }
  }

  pub fn bad_array_size(info: AllocatorInfo, passed: usize, supported: usize) -> Self {
    Self::BadAllocationSize { info, kind: SizeKind::Array, passed, supported }
  }

  pub fn bad_alignment(info: AllocatorInfo, passed: usize, supported: usize) -> Self {
    Self::BadAllocationSize { info, kind: SizeKind::Alignment, passed, supported }
  }
}

pub type Result<T> = std::result::Result<T, AllocatorError>;

/// Handler invoked when a growable (or fixed) provider runs out of memory,
/// before the corresponding [`AllocatorError`] is returned.
pub type OutOfMemoryHandler = fn(info: &AllocatorInfo, requested: usize);

/// Handler invoked when a size/alignment request exceeds the allocator's
/// advertised maximum, before [`AllocatorError::BadAllocationSize`] is
/// returned.
pub type BadSizeHandler = fn(info: &AllocatorInfo, kind: SizeKind, passed: usize, supported: usize);

/// Handler invoked on deallocation with an unrecognised pointer.
/// Defaults to logging and aborting the process.
pub type InvalidPointerHandler = fn(info: &AllocatorInfo, ptr: *const u8);

/// Handler invoked when a fence byte doesn't match its magic value.
/// Defaults to logging and aborting the process.
pub type BufferOverflowHandler = fn(block: *const u8, block_size: usize, bad_ptr: *const u8);

/// Handler invoked at end-of-life with a non-zero allocation residual.
/// `amount` is positive for a leak, negative for an accounting
/// over-deallocation. Never aborts by default.
pub type LeakHandler = fn(info: &AllocatorInfo, amount: isize);

fn default_out_of_memory(info: &AllocatorInfo, requested: usize) {
  log::error!("{info}: out of memory requesting {requested} bytes");
}

fn default_bad_size(info: &AllocatorInfo, kind: SizeKind, passed: usize, supported: usize) {
  log::error!("{info}: bad {kind} size: requested {passed}, supported up to {supported}");
}

fn default_invalid_pointer(info: &AllocatorInfo, ptr: *const u8) {
  log::error!("{info}: invalid pointer {ptr:?}, aborting");
  std::process::abort();
}

fn default_buffer_overflow(block: *const u8, block_size: usize, bad_ptr: *const u8) {
  log::error!(
    "buffer overflow detected at {bad_ptr:?} (block {block:?}, size {block_size}), aborting"
  );
  std::process::abort();
}

fn default_leak(info: &AllocatorInfo, amount: isize) {
  if amount > 0 {
    log::warn!("{info}: leaked {amount} bytes worth of accounting units");
  } else if amount < 0 {
    log::warn!("{info}: over-deallocated by {} bytes worth of accounting units", -amount);
  }
}

/// A process-wide, atomically swappable slot holding one handler function
/// pointer. `exchange` gives the swap-and-return-old contract the
/// global handler tables rely on.
struct HandlerSlot<F: Copy> {
  slot: AtomicUsize,
  default: F,
}

impl<F: Copy> HandlerSlot<F> {
  const fn new(default: F) -> Self {
    Self { slot: AtomicUsize::new(0), default }
  }

  fn get(&self) -> F
  where
    F: 'static,
  {
    let raw = self.slot.load(Ordering::Acquire);
    if raw == 0 {
      self.default
    } else {
      // SAFETY: the only non-zero values ever stored are produced by
      // `exchange`, which receives a real `F` and transmutes it to a
      // function-pointer-sized integer.
      unsafe { std::mem::transmute_copy::<usize, F>(&raw) }
    }
  }

  fn exchange(&self, handler: F) -> F
  where
    F: 'static,
  {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
    // SAFETY: F is a fn pointer type (size_of::<F>() == size_of::<usize>()),
    // so this transmute is a bit-for-bit reinterpretation.
    let raw = unsafe { std::mem::transmute_copy::<F, usize>(&handler) };
    let prev = self.slot.swap(raw, Ordering::AcqRel);
    if prev == 0 {
      self.default
    } else {
      unsafe { std::mem::transmute_copy::<usize, F>(&prev) }
    }
  }
}

static OUT_OF_MEMORY_HANDLER: HandlerSlot<OutOfMemoryHandler> =
  HandlerSlot::new(default_out_of_memory);
static BAD_SIZE_HANDLER: HandlerSlot<BadSizeHandler> = HandlerSlot::new(default_bad_size);
static INVALID_POINTER_HANDLER: HandlerSlot<InvalidPointerHandler> =
  HandlerSlot::new(default_invalid_pointer);
static BUFFER_OVERFLOW_HANDLER: HandlerSlot<BufferOverflowHandler> =
  HandlerSlot::new(default_buffer_overflow);
static LEAK_HANDLER: HandlerSlot<LeakHandler> = HandlerSlot::new(default_leak);

/// Sets the process-wide out-of-memory handler, returning the previous one.
pub fn set_out_of_memory_handler(handler: OutOfMemoryHandler) -> OutOfMemoryHandler {
  OUT_OF_MEMORY_HANDLER.exchange(handler)
}

/// Sets the process-wide bad-allocation-size handler, returning the
/// previous one.
pub fn set_bad_size_handler(handler: BadSizeHandler) -> BadSizeHandler {
  BAD_SIZE_HANDLER.exchange(handler)
}

/// Sets the process-wide invalid-pointer handler, returning the previous
/// one.
pub fn set_invalid_pointer_handler(handler: InvalidPointerHandler) -> InvalidPointerHandler {
  INVALID_POINTER_HANDLER.exchange(handler)
}

/// Sets the process-wide buffer-overflow handler, returning the previous
/// one.
pub fn set_buffer_overflow_handler(handler: BufferOverflowHandler) -> BufferOverflowHandler {
  BUFFER_OVERFLOW_HANDLER.exchange(handler)
}

/// Sets the process-wide leak handler, returning the previous one.
pub fn set_leak_handler(handler: LeakHandler) -> LeakHandler {
  LEAK_HANDLER.exchange(handler)
}

/// Reports an out-of-memory condition: runs the registered handler, then
/// builds the error to return.
pub(crate) fn report_out_of_memory(info: AllocatorInfo, requested: usize) -> AllocatorError {
  (OUT_OF_MEMORY_HANDLER.get())(&info, requested);
  AllocatorError::OutOfMemory { info, requested }
}

/// Reports a fixed-provider out-of-memory condition.
pub(crate) fn report_out_of_fixed_memory(info: AllocatorInfo, requested: usize) -> AllocatorError {
  (OUT_OF_MEMORY_HANDLER.get())(&info, requested);
  AllocatorError::OutOfFixedMemory { info, requested }
}

/// Reports a bad allocation size/alignment.
pub(crate) fn report_bad_size(
  info: AllocatorInfo,
  kind: SizeKind,
  passed: usize,
  supported: usize,
) -> AllocatorError {
  (BAD_SIZE_HANDLER.get())(&info, kind, passed, supported);
  AllocatorError::BadAllocationSize { info, kind, passed, supported }
}

/// Invokes the invalid-pointer handler. Returns the error in case the
/// handler chose not to abort.
pub(crate) fn report_invalid_pointer(info: AllocatorInfo, ptr: *const u8) -> AllocatorError {
  (INVALID_POINTER_HANDLER.get())(&info, ptr);
  AllocatorError::InvalidPointer { info, ptr }
}

/// Invokes the invalid-pointer handler for a detected double free.
pub(crate) fn report_double_free(info: AllocatorInfo, ptr: *const u8) -> AllocatorError {
  (INVALID_POINTER_HANDLER.get())(&info, ptr);
  AllocatorError::DoubleFree { info, ptr }
}

/// Invokes the buffer-overflow handler.
pub(crate) fn report_buffer_overflow(
  block: *const u8,
  block_size: usize,
  bad_ptr: *const u8,
) -> AllocatorError {
  (BUFFER_OVERFLOW_HANDLER.get())(block, block_size, bad_ptr);
  AllocatorError::BufferOverflow { info: AllocatorInfo::new("<fence>", std::ptr::null()), ptr: bad_ptr }
}

/// Invokes the leak handler with the residual accounting `amount`.
pub(crate) fn report_leak(info: AllocatorInfo, amount: isize) {
  (LEAK_HANDLER.get())(&info, amount);
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};

  static CALLS: StdAtomicUsize = StdAtomicUsize::new(0);

  fn counting_handler(_info: &AllocatorInfo, _requested: usize) {
    CALLS.fetch_add(1, StdOrdering::SeqCst);
  }

  #[test]
  fn exchange_returns_previous_and_installs_new() {
    let prev = set_out_of_memory_handler(counting_handler);
    let before = CALLS.load(StdOrdering::SeqCst);
    report_out_of_memory(AllocatorInfo::new("test", std::ptr::null()), 42);
    assert_eq!(CALLS.load(StdOrdering::SeqCst), before + 1);

    // restore so other tests in this binary see default behaviour
    set_out_of_memory_handler(prev);
  }

  #[test]
  fn bad_allocation_size_variants_carry_kind() {
    let info = AllocatorInfo::new("test", std::ptr::null());
    match AllocatorError::bad_node_size(info, 10, 4) {
      AllocatorError::BadAllocationSize { kind: SizeKind::Node, passed, supported, .. } => {
        assert_eq!(passed, 10);
        assert_eq!(supported, 4);
      }
      _ => panic!("wrong variant"),
    }
  }
}
