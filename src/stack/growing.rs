//! A growing memory stack: an [`Arena`] feeding a [`FixedStack`], requesting
//! a new block whenever the current one runs dry.
//!
//! Grounded in `original_source/stack_allocator.hpp`'s `memory_stack`:
//! `list_`/`stack_` there are this module's `arena`/`stack`, and
//! `detail::stack_marker` (block-list depth + a copy of the fixed stack) is
//! [`Marker`] below.

use crate::arena::Arena;
use crate::block::BlockProvider;
use crate::debug::DebugConfig;
use crate::error::{AllocatorError, AllocatorInfo, Result};
use crate::stack::fixed::FixedStack;

/// A position in a [`GrowingStack`] that can be unwound back to. Captures
/// both how many blocks were in use and the exact bump state within the
/// block that was current, the way the original's `stack_marker` bundles
/// a block-list index with a whole `fixed_memory_stack` copy.
#[derive(Debug, Clone, Copy)]
pub struct Marker {
  depth: usize,
  state: (*mut u8, *const u8),
}

/// A memory stack that transparently grows by pulling new, larger blocks
/// from an arena when the current block is exhausted.
pub struct GrowingStack<P> {
  arena: Arena<P>,
  stack: FixedStack,
  fence_size: usize,
  debug: DebugConfig,
}

impl<P: BlockProvider> GrowingStack<P> {
  /// Builds a growing stack, eagerly allocating its first block (so
  /// `allocate` never needs to special-case "no block yet").
  pub fn new(provider: P, cached: bool, fence_size: usize, debug: DebugConfig) -> Result<Self> {
    let mut arena = Arena::new(provider, cached, debug);
    let block = arena.allocate_block()?;
    let stack = unsafe { FixedStack::new(block.memory, block.size) };
    Ok(Self { arena, stack, fence_size, debug })
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::stack::GrowingStack", self as *const _ as *const ())
  }

  /// Allocates `size` bytes aligned to `alignment`. Pulls a new block from
  /// the arena (growing its size, per [`crate::providers::HeapBlockProvider`]
  /// et al.) if the current one cannot fit the request, the same one-retry
  /// shape as the original's `allocate`. If the request still doesn't fit
  /// the fresh block, that means `size` itself is unserviceable rather than
  /// the arena being out of memory, so the two errors are reported
  /// separately: `BadNodeSize` when `size` exceeds what even a whole new
  /// block could hold, `OutOfMemory` otherwise.
  pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<*mut u8> {
    if let Some(p) = self.stack.try_allocate(size, alignment, self.fence_size, self.debug.fill) {
      return Ok(p);
    }
    let block = self.arena.allocate_block()?;
    unsafe { self.stack.reset(block.memory, block.size) };
    self.stack.try_allocate(size, alignment, self.fence_size, self.debug.fill).ok_or_else(|| {
      if size > block.size {
        crate::error::report_bad_size(self.info(), crate::error::SizeKind::Node, size, block.size)
      } else {
        crate::error::report_out_of_memory(self.info(), size)
      }
    })
  }

  /// A marker to the current top of the stack.
  pub fn marker(&self) -> Marker {
    Marker { depth: self.arena.size().saturating_sub(1), state: self.stack.snapshot() }
  }

  /// Unwinds to `marker`: releases every block allocated after it and
  /// restores the bump pointer within the block that was current then.
  ///
  /// # Safety
  /// `marker` must have come from this stack instance and name a point no
  /// later markers have already unwound past.
  pub unsafe fn unwind(&mut self, marker: Marker) {
    let diff = self.arena.size() - marker.depth - 1;
    for _ in 0..diff {
      self.arena.deallocate_block();
    }
    unsafe { self.stack.restore(marker.state) };
  }

  /// Bytes remaining in the current block.
  pub fn capacity(&self) -> usize {
    self.stack.remaining()
  }

  /// Size of the block the arena will hand out next — also the largest
  /// single allocation this stack can guarantee to satisfy.
  pub fn next_capacity(&self) -> usize {
    self.arena.next_block_size()
  }

  /// Releases every cached-but-unused block.
  pub fn shrink_to_fit(&mut self) {
    self.arena.shrink_to_fit();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::providers::HeapBlockProvider;

  #[test]
  fn allocate_grows_into_a_new_block_when_full() {
    let mut stack = GrowingStack::new(HeapBlockProvider::new(32), false, 0, DebugConfig::default()).unwrap();
    let first_capacity = stack.capacity();
    // Exhaust the first block.
    while stack.capacity() >= 8 {
      stack.allocate(8, 8).unwrap();
    }
    // This allocation must grow.
    let p = stack.allocate(8, 8).unwrap();
    assert!(!p.is_null());
    assert_ne!(first_capacity, stack.capacity());
  }

  #[test]
  fn unwind_releases_blocks_allocated_after_marker() {
    let mut stack = GrowingStack::new(HeapBlockProvider::new(16), false, 0, DebugConfig::default()).unwrap();
    let marker = stack.marker();

    while stack.capacity() >= 8 {
      stack.allocate(8, 8).unwrap();
    }
    stack.allocate(8, 8).unwrap(); // forces growth into a second block

    unsafe { stack.unwind(marker) };
    assert_eq!(stack.capacity(), 16);
  }

  #[test]
  fn allocate_reports_bad_size_when_request_exceeds_block_size() {
    let mut stack = GrowingStack::new(HeapBlockProvider::new(16), false, 0, DebugConfig::default()).unwrap();
    let err = stack.allocate(1024, 8).unwrap_err();
    assert!(matches!(err, AllocatorError::BadAllocationSize { .. }));
  }
}
