//! The iteration stack: `N` equal-size bump regions over a single block,
//! round-robined by [`IterationStack::next_iteration`].
//!
//! Grounded in
//! `original_source/include/foonathan/memory/iteration_allocator.hpp`'s
//! `iteration_allocator<N, _>`: `stacks_`/`cur_` there are `regions`/
//! `cur_index` here. Unlike the original's compile-time `N`, this crate
//! takes `regions` as a runtime count — nothing requires it fixed at
//! compile time, and a runtime count lets one block provider be shared
//! by iteration stacks of different widths.

use crate::block::{Block, BlockProvider};
use crate::debug::DebugConfig;
use crate::error::{AllocatorInfo, Result, report_out_of_fixed_memory};
use crate::stack::FixedStack;

/// A single block divided into `N` equal regions, each bumped through
/// independently; advancing to the next region resets it, recycling its
/// memory for the new iteration while the other `N - 1` regions' contents
/// stay live.
pub struct IterationStack<P> {
  provider: P,
  block: Block,
  regions: Vec<FixedStack>,
  region_size: usize,
  cur_index: usize,
  fence_size: usize,
  debug: DebugConfig,
}

impl<P: BlockProvider> IterationStack<P> {
  /// Allocates one block from `provider` (whose configured block size
  /// determines the total size divided among regions) and splits it into
  /// `region_count` equal regions.
  pub fn new(mut provider: P, region_count: usize, fence_size: usize, debug: DebugConfig) -> Result<Self> {
    debug_assert!(region_count > 0);
    let block = provider.allocate_block()?;
    let region_size = block.size / region_count;
    let regions = (0..region_count)
      .map(|i| unsafe { FixedStack::new(block.memory.add(i * region_size), region_size) })
      .collect();
    Ok(Self { provider, block, regions, region_size, cur_index: 0, fence_size, debug })
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::iteration::IterationStack", self as *const _ as *const ())
  }

  /// Allocates from the currently active region.
  pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<*mut u8> {
    let fence_size = self.fence_size;
    let remaining = self.regions[self.cur_index]
      .try_allocate(size, alignment, fence_size, self.debug.fill)
      .ok_or_else(|| report_out_of_fixed_memory(self.info(), size));
    remaining
  }

  /// Advances to the next region (mod `region_count`), resetting it to its
  /// region start — this both starts the new iteration and reclaims
  /// whatever that region held `region_count - 1` iterations ago.
  pub fn next_iteration(&mut self) {
    self.cur_index = (self.cur_index + 1) % self.regions.len();
    let start = unsafe { self.block.memory.add(self.cur_index * self.region_size) };
    unsafe { self.regions[self.cur_index].reset(start, self.region_size) };
  }

  /// The number of regions this stack cycles through.
  pub fn max_iterations(&self) -> usize {
    self.regions.len()
  }

  /// The index of the currently active region.
  pub fn cur_iteration(&self) -> usize {
    self.cur_index
  }

  /// Bytes remaining in region `i`.
  pub fn capacity_left_of(&self, i: usize) -> usize {
    self.regions[i].remaining()
  }

  /// Bytes remaining in the active region.
  pub fn capacity_left(&self) -> usize {
    self.capacity_left_of(self.cur_index)
  }
}

impl<P: BlockProvider> Drop for IterationStack<P> {
  fn drop(&mut self) {
    unsafe { self.provider.deallocate_block(self.block) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::providers::HeapBlockProvider;

  #[test]
  fn allocate_uses_active_region_and_next_iteration_rotates() {
    let mut it = IterationStack::new(HeapBlockProvider::new(256), 2, 0, DebugConfig::default()).unwrap();
    assert_eq!(it.cur_iteration(), 0);

    let p0 = it.allocate(8, 8).unwrap();
    it.next_iteration();
    assert_eq!(it.cur_iteration(), 1);
    let p1 = it.allocate(8, 8).unwrap();
    assert_ne!(p0, p1);

    // Two iterations later region 0 is reclaimed, not 1.
    it.next_iteration();
    assert_eq!(it.cur_iteration(), 0);
    assert_eq!(it.capacity_left_of(0), 128);
  }

  #[test]
  fn allocate_fails_once_region_is_full() {
    let mut it = IterationStack::new(HeapBlockProvider::new(64), 2, 0, DebugConfig::default()).unwrap();
    // Each region is 32 bytes.
    it.allocate(24, 8).unwrap();
    assert!(it.allocate(24, 8).is_err());
  }
}
