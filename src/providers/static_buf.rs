//! A fixed, one-shot block provider over a caller-supplied buffer.
//!
//! Grounded in `original_source/src/static_allocator.cpp`'s
//! `static_block_allocator`: blocks are carved off a fixed region in a
//! strict bump fashion, and since the region never grows, exhaustion is an
//! [`crate::error::AllocatorError::OutOfFixedMemory`] rather than an
//! [`crate::error::AllocatorError::OutOfMemory`]. Like the original,
//! deallocation is only valid in LIFO order — the provider checks this and
//! reports an invalid pointer otherwise.

use crate::block::{Block, BlockProvider};
use crate::error::{AllocatorInfo, Result, report_invalid_pointer, report_out_of_fixed_memory};

/// A [`BlockProvider`] that hands out fixed-size blocks from a
/// caller-owned buffer until it is exhausted.
pub struct StaticBlockProvider {
  start: *mut u8,
  end: *mut u8,
  cur: *mut u8,
  block_size: usize,
}

impl StaticBlockProvider {
  /// Builds a provider over `buffer`, handing out `block_size`-byte blocks.
  ///
  /// # Safety
  /// `buffer` must remain valid and exclusively owned by this provider
  /// (and the blocks it hands out) for the provider's whole lifetime.
  pub unsafe fn new(buffer: &mut [u8], block_size: usize) -> Self {
    let start = buffer.as_mut_ptr();
    let end = unsafe { start.add(buffer.len()) };
    Self { start, end, cur: start, block_size }
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::providers::StaticBlockProvider", self as *const _ as *const ())
  }
}

impl BlockProvider for StaticBlockProvider {
  fn allocate_block(&mut self) -> Result<Block> {
    let remaining = self.end as usize - self.cur as usize;
    if remaining < self.block_size {
      return Err(report_out_of_fixed_memory(self.info(), self.block_size));
    }
    let mem = self.cur;
    self.cur = unsafe { self.cur.add(self.block_size) };
    Ok(Block::new(mem, self.block_size))
  }

  unsafe fn deallocate_block(&mut self, block: Block) {
    let expected_end = unsafe { block.memory.add(block.size) };
    if expected_end != self.cur {
      report_invalid_pointer(self.info(), block.memory);
      return;
    }
    self.cur = unsafe { self.cur.sub(self.block_size) };
  }

  fn next_block_size(&self) -> usize {
    self.block_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hands_out_blocks_until_exhausted() {
    let mut buf = [0u8; 32];
    let mut provider = unsafe { StaticBlockProvider::new(&mut buf, 16) };

    let b1 = provider.allocate_block().unwrap();
    assert_eq!(b1.size, 16);
    let b2 = provider.allocate_block().unwrap();
    assert_eq!(b2.size, 16);

    assert!(provider.allocate_block().is_err());

    unsafe {
      provider.deallocate_block(b2);
      provider.deallocate_block(b1);
    }
  }

  #[test]
  fn blocks_can_be_reused_after_lifo_deallocation() {
    let mut buf = [0u8; 16];
    let mut provider = unsafe { StaticBlockProvider::new(&mut buf, 16) };

    let b1 = provider.allocate_block().unwrap();
    unsafe { provider.deallocate_block(b1) };

    let b2 = provider.allocate_block().unwrap();
    assert_eq!(b2.memory, buf.as_mut_ptr());
  }
}
