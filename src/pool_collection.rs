//! A size-class-bucketed collection of pools sharing one arena.
//!
//! Grounded in `original_source/memory_pool_collection.hpp`'s
//! `memory_pool_collection<PoolType, RawAllocator>`: two parallel
//! `free_list_array`s there (the non-ordered one used for node requests,
//! the ordered one for array requests) become [`FreeListArray`] of
//! [`IntrusiveFreeList`] and [`OrderedFreeList`] here, both refilled from
//! the same [`Arena`].

use crate::arena::Arena;
use crate::block::BlockProvider;
use crate::debug::DebugConfig;
use crate::error::{AllocatorInfo, Result, SizeKind, report_bad_size};
use crate::free_list::{FreeListArray, IntrusiveFreeList, OrderedFreeList};
use crate::traits::RawAllocator;

/// Bucketed pools for node allocation (`IntrusiveFreeList`, cheaper, LIFO)
/// and array allocation (`OrderedFreeList`, address-ordered so contiguous
/// runs can be found), all refilled from one shared [`Arena`].
pub struct PoolCollection<P> {
  arena: Arena<P>,
  nodes: FreeListArray<IntrusiveFreeList>,
  arrays: FreeListArray<OrderedFreeList>,
}

impl<P: BlockProvider> PoolCollection<P> {
  pub fn new(provider: P, min_node_size: usize, max_node_size: usize, cached: bool, debug: DebugConfig) -> Self {
    let arena = Arena::new(provider, cached, debug);
    let nodes = FreeListArray::new(min_node_size, max_node_size, debug);
    let arrays = FreeListArray::new(min_node_size, max_node_size, debug);
    Self { arena, nodes, arrays }
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::pool_collection::PoolCollection", self as *const _ as *const ())
  }

  pub fn min_node_size(&self) -> usize {
    self.nodes.min_node_size()
  }

  pub fn max_node_size(&self) -> usize {
    self.nodes.max_node_size()
  }

  pub fn shrink_to_fit(&mut self) {
    self.arena.shrink_to_fit();
  }
}

impl<P: BlockProvider> RawAllocator for PoolCollection<P> {
  fn allocate_node(&mut self, size: usize, _alignment: usize) -> Result<*mut u8> {
    let idx = self.nodes.bucket_for(size)?;
    if self.nodes.get(idx).empty() {
      let block = self.arena.allocate_block()?;
      unsafe { self.nodes.get_mut(idx).insert(block.memory, block.size) };
    }
    Ok(unsafe { self.nodes.get_mut(idx).allocate() })
  }

  fn allocate_array(&mut self, count: usize, size: usize, _alignment: usize) -> Result<*mut u8> {
    let idx = self.arrays.bucket_for(size)?;
    let total = count * self.arrays.size_of(idx);
    if self.arrays.get(idx).empty() {
      let block = self.arena.allocate_block()?;
      unsafe { self.arrays.get_mut(idx).insert(block.memory, block.size) };
    }
    if let Some(p) = unsafe { self.arrays.get_mut(idx).allocate_array(total) } {
      return Ok(p);
    }
    if total > self.arena.next_block_size() {
      return Err(report_bad_size(self.info(), SizeKind::Array, total, self.arena.next_block_size()));
    }
    let block = self.arena.allocate_block()?;
    unsafe { self.arrays.get_mut(idx).insert(block.memory, block.size) };
    unsafe { self.arrays.get_mut(idx).allocate_array(total) }
      .ok_or_else(|| crate::error::report_out_of_fixed_memory(self.info(), total))
  }

  unsafe fn deallocate_node(&mut self, ptr: *mut u8, size: usize, _alignment: usize) {
    let idx = self.nodes.index(size);
    unsafe { self.nodes.get_mut(idx).deallocate(ptr) };
  }

  unsafe fn deallocate_array(&mut self, ptr: *mut u8, count: usize, size: usize, _alignment: usize) {
    let idx = self.arrays.index(size);
    let total = count * self.arrays.size_of(idx);
    unsafe { self.arrays.get_mut(idx).deallocate_array(ptr, total) };
  }

  fn max_node_size(&self) -> usize {
    self.nodes.max_node_size()
  }

  fn max_alignment(&self) -> usize {
    crate::align::MAX_ALIGNMENT
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::providers::HeapBlockProvider;

  #[test]
  fn allocate_node_picks_bucket_by_size() {
    let mut pc = PoolCollection::new(HeapBlockProvider::new(4096), 8, 256, true, DebugConfig::default());
    let a = pc.allocate_node(8, 8).unwrap();
    let b = pc.allocate_node(200, 8).unwrap();
    assert_ne!(a, b);
    unsafe {
      pc.deallocate_node(a, 8, 8);
      pc.deallocate_node(b, 200, 8);
    }
  }

  #[test]
  fn allocate_node_rejects_sizes_above_max() {
    let mut pc = PoolCollection::new(HeapBlockProvider::new(4096), 8, 256, true, DebugConfig::default());
    assert!(pc.allocate_node(1024, 8).is_err());
  }

  #[test]
  fn allocate_array_then_deallocate_array_roundtrips() {
    let mut pc = PoolCollection::new(HeapBlockProvider::new(4096), 8, 256, true, DebugConfig::default());
    let p = pc.allocate_array(4, 16, 8).unwrap();
    assert!(!p.is_null());
    unsafe { pc.deallocate_array(p, 4, 16, 8) };
  }
}
