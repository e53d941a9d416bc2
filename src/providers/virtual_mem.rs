//! A page-granularity block provider backed by `mmap`/`munmap`.
//!
//! Grounded in `original_source/src/virtual_memory.cpp`'s POSIX branch, and
//! in this crate's own direct `libc` FFI use elsewhere (`sbrk` for the heap
//! provider's growth accounting, `mmap` here). Each block is a whole
//! number of pages, reserved and committed
//! in one call (the original source's reserve/commit split exists for the
//! Windows `VirtualAlloc` two-step; POSIX `mmap` with `MAP_ANONYMOUS`
//! already commits).

use crate::align::MAX_ALIGNMENT;
use crate::block::{Block, BlockProvider};
use crate::error::{AllocatorInfo, Result, report_out_of_memory};

fn page_size() -> usize {
  // SAFETY: sysconf with _SC_PAGESIZE never fails on a supported platform.
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  size.max(1) as usize
}

/// A [`BlockProvider`] that reserves whole pages via `mmap`, doubling the
/// page count requested on every call.
pub struct VirtualMemoryBlockProvider {
  page_size: usize,
  next_pages: usize,
}

impl VirtualMemoryBlockProvider {
  /// Creates a provider whose first block is at least `initial_block_size`
  /// bytes, rounded up to a whole number of pages.
  pub fn new(initial_block_size: usize) -> Self {
    let page_size = page_size();
    let pages = initial_block_size.div_ceil(page_size).max(1);
    Self { page_size, next_pages: pages }
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new(
      "rallocator::providers::VirtualMemoryBlockProvider",
      self as *const _ as *const (),
    )
  }
}

impl BlockProvider for VirtualMemoryBlockProvider {
  fn allocate_block(&mut self) -> Result<Block> {
    let size = self.next_pages * self.page_size;

    let ptr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };
    if ptr == libc::MAP_FAILED {
      return Err(report_out_of_memory(self.info(), size));
    }

    self.next_pages *= 2;
    Ok(Block::new(ptr as *mut u8, size))
  }

  unsafe fn deallocate_block(&mut self, block: Block) {
    unsafe {
      libc::munmap(block.memory as *mut libc::c_void, block.size);
    }
  }

  fn next_block_size(&self) -> usize {
    self.next_pages * self.page_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blocks_are_page_aligned_and_writable() {
    let mut provider = VirtualMemoryBlockProvider::new(1);
    let block = provider.allocate_block().unwrap();
    assert!(block.size >= 1);
    assert_eq!((block.memory as usize) % provider.page_size, 0);
    assert!(block.size % MAX_ALIGNMENT == 0 || block.size >= MAX_ALIGNMENT);

    unsafe {
      std::ptr::write_bytes(block.memory, 0x42, block.size);
      assert_eq!(*block.memory, 0x42);
      provider.deallocate_block(block);
    }
  }

  #[test]
  fn page_count_doubles_each_call() {
    let mut provider = VirtualMemoryBlockProvider::new(1);
    let first = provider.next_block_size();
    let b1 = provider.allocate_block().unwrap();
    assert_eq!(provider.next_block_size(), first * 2);
    unsafe { provider.deallocate_block(b1) };
  }
}
