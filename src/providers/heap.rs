//! A growable block provider backed by the global heap allocator.
//!
//! This is the generalisation of a bare `sbrk`-based growth strategy:
//! instead of extending the process break directly, each block comes from
//! `std::alloc::alloc`, and the provider doubles its request size on every
//! call the way `original_source/detail/block_list.hpp`'s `block_list`
//! grows its blocks.

use std::alloc::{self, Layout};

use crate::align::MAX_ALIGNMENT;
use crate::block::{Block, BlockProvider};
use crate::error::{AllocatorInfo, Result, report_out_of_memory};

/// Growth factor applied to the block size after every `allocate_block`
/// call, matching `original_source/detail/block_list.hpp`'s
/// `growth_factor = 2`.
const GROWTH_FACTOR: usize = 2;

/// A [`BlockProvider`] that grows blocks geometrically, each one a fresh
/// heap allocation aligned to [`MAX_ALIGNMENT`].
#[derive(Debug)]
pub struct HeapBlockProvider {
  next_block_size: usize,
}

impl HeapBlockProvider {
  /// Creates a provider whose first block will be `initial_block_size`
  /// bytes (rounded up to a multiple of [`MAX_ALIGNMENT`] by the layout
  /// machinery).
  pub fn new(initial_block_size: usize) -> Self {
    Self { next_block_size: initial_block_size.max(MAX_ALIGNMENT) }
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::providers::HeapBlockProvider", self as *const _ as *const ())
  }
}

impl BlockProvider for HeapBlockProvider {
  fn allocate_block(&mut self) -> Result<Block> {
    let size = self.next_block_size;
    let layout = Layout::from_size_align(size, MAX_ALIGNMENT)
      .expect("block size/alignment overflow usize");

    let memory = unsafe { alloc::alloc(layout) };
    if memory.is_null() {
      return Err(report_out_of_memory(self.info(), size));
    }

    self.next_block_size = size.saturating_mul(GROWTH_FACTOR);
    Ok(Block::new(memory, size))
  }

  unsafe fn deallocate_block(&mut self, block: Block) {
    let layout = Layout::from_size_align(block.size, MAX_ALIGNMENT)
      .expect("block size/alignment overflow usize");
    unsafe { alloc::dealloc(block.memory, layout) };
  }

  fn next_block_size(&self) -> usize {
    self.next_block_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocated_blocks_are_aligned_and_sized() {
    let mut provider = HeapBlockProvider::new(64);
    let block = provider.allocate_block().unwrap();
    assert_eq!(block.size, 64);
    assert!((block.memory as usize) % MAX_ALIGNMENT == 0);
    unsafe { provider.deallocate_block(block) };
  }

  #[test]
  fn block_size_doubles_each_call() {
    let mut provider = HeapBlockProvider::new(32);
    assert_eq!(provider.next_block_size(), 32);

    let b1 = provider.allocate_block().unwrap();
    assert_eq!(b1.size, 32);
    assert_eq!(provider.next_block_size(), 64);

    let b2 = provider.allocate_block().unwrap();
    assert_eq!(b2.size, 64);
    assert_eq!(provider.next_block_size(), 128);

    unsafe {
      provider.deallocate_block(b1);
      provider.deallocate_block(b2);
    }
  }
}
