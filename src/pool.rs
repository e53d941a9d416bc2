//! A single-size-class pool allocator: an [`Arena`] feeding one
//! [`OrderedFreeList`], owning the arena that feeds it.
//!
//! Grounded in `original_source/memory_pool.hpp`'s `memory_pool<Tag,
//! RawAllocator>`: the ordered list (not the plain intrusive one) is used
//! here, not for object-identity reasons but because it is the one flavour
//! that can also serve array requests, so one pool type covers both
//! `allocate_node` and `allocate_array`.

use crate::arena::Arena;
use crate::block::BlockProvider;
use crate::debug::{DebugConfig, LeakChecker};
use crate::error::{AllocatorInfo, Result, report_bad_size, report_out_of_fixed_memory};
use crate::error::SizeKind;
use crate::free_list::OrderedFreeList;
use crate::traits::RawAllocator;

/// A pool of fixed-`node_size` memory, refilled one [`crate::block::Block`]
/// at a time from its arena as the free list runs dry.
///
/// Tracks outstanding nodes via a [`LeakChecker`] when `debug.leak_check` is
/// set at construction.
pub struct Pool<P> {
  arena: Arena<P>,
  free_list: OrderedFreeList,
  leak: LeakChecker,
}

impl<P: BlockProvider> Pool<P> {
  /// Builds a pool of `node_size`-byte nodes over `provider`, eagerly
  /// pulling and threading the first block. `debug.leak_check` turns on
  /// per-instance leak tracking: a node allocated and never returned is
  /// reported through the global leak handler when the pool is dropped.
  pub fn new(provider: P, node_size: usize, cached: bool, debug: DebugConfig) -> Result<Self> {
    let mut arena = Arena::new(provider, cached, debug);
    let mut free_list = OrderedFreeList::new(node_size, debug);
    let block = arena.allocate_block()?;
    unsafe { free_list.insert(block.memory, block.size) };
    let leak = LeakChecker::new(
      AllocatorInfo::new("rallocator::pool::Pool", std::ptr::null()),
      debug.leak_check,
    );
    Ok(Self { arena, free_list, leak })
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::pool::Pool", self as *const _ as *const ())
  }

  fn refill(&mut self) -> Result<()> {
    let block = self.arena.allocate_block()?;
    unsafe { self.free_list.insert(block.memory, block.size) };
    Ok(())
  }

  pub fn node_size(&self) -> usize {
    self.free_list.node_size()
  }

  /// Free nodes currently threaded (not yet handed out).
  pub fn capacity(&self) -> usize {
    self.free_list.capacity()
  }

  pub fn shrink_to_fit(&mut self) {
    self.arena.shrink_to_fit();
  }
}

impl<P: BlockProvider> RawAllocator for Pool<P> {
  fn allocate_node(&mut self, size: usize, _alignment: usize) -> Result<*mut u8> {
    if size > self.node_size() {
      return Err(report_bad_size(self.info(), SizeKind::Node, size, self.node_size()));
    }
    if self.free_list.empty() {
      self.refill()?;
    }
    let node_size = self.node_size();
    let p = unsafe { self.free_list.allocate() };
    self.leak.on_allocate(node_size);
    Ok(p)
  }

  fn allocate_array(&mut self, count: usize, size: usize, _alignment: usize) -> Result<*mut u8> {
    let total = count * size;
    if self.free_list.empty() {
      self.refill()?;
    }
    if let Some(p) = unsafe { self.free_list.allocate_array(total) } {
      self.leak.on_allocate(total);
      return Ok(p);
    }
    if total > self.arena.next_block_size() {
      return Err(report_bad_size(self.info(), SizeKind::Array, total, self.arena.next_block_size()));
    }
    self.refill()?;
    let p = unsafe { self.free_list.allocate_array(total) }
      .ok_or_else(|| report_out_of_fixed_memory(self.info(), total))?;
    self.leak.on_allocate(total);
    Ok(p)
  }

  unsafe fn deallocate_node(&mut self, ptr: *mut u8, _size: usize, _alignment: usize) {
    unsafe { self.free_list.deallocate(ptr) };
    self.leak.on_deallocate(self.node_size());
  }

  unsafe fn deallocate_array(&mut self, ptr: *mut u8, count: usize, size: usize, _alignment: usize) {
    unsafe { self.free_list.deallocate_array(ptr, count * size) };
    self.leak.on_deallocate(count * size);
  }

  fn max_node_size(&self) -> usize {
    self.node_size()
  }

  fn max_alignment(&self) -> usize {
    self.free_list.alignment()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::providers::HeapBlockProvider;

  #[test]
  fn allocate_and_deallocate_node_roundtrips() {
    let mut pool = Pool::new(HeapBlockProvider::new(4096), 32, true, DebugConfig::default()).unwrap();
    let p = pool.allocate_node(32, 8).unwrap();
    assert!(!p.is_null());
    unsafe { pool.deallocate_node(p, 32, 8) };
  }

  #[test]
  fn allocate_node_refills_when_list_runs_dry() {
    let mut pool = Pool::new(HeapBlockProvider::new(128), 32, false, DebugConfig::default()).unwrap();
    let mut ptrs = Vec::new();
    for _ in 0..8 {
      ptrs.push(pool.allocate_node(32, 8).unwrap());
    }
    for p in ptrs {
      unsafe { pool.deallocate_node(p, 32, 8) };
    }
  }

  #[test]
  fn allocate_array_then_deallocate_array_roundtrips() {
    let mut pool = Pool::new(HeapBlockProvider::new(4096), 16, true, DebugConfig::default()).unwrap();
    let p = pool.allocate_array(4, 16, 8).unwrap();
    assert!(!p.is_null());
    unsafe { pool.deallocate_array(p, 4, 16, 8) };
  }

  #[test]
  fn undeallocated_node_reports_leak_on_drop() {
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::sync::atomic::AtomicUsize;

    static SEEN: AtomicIsize = AtomicIsize::new(0);
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    fn handler(_info: &AllocatorInfo, amount: isize) {
      SEEN.store(amount, Ordering::SeqCst);
      CALLS.fetch_add(1, Ordering::SeqCst);
    }
    let prev = crate::error::set_leak_handler(handler);

    {
      let mut pool = Pool::new(
        HeapBlockProvider::new(4096),
        32,
        true,
        DebugConfig { leak_check: true, ..DebugConfig::default() },
      )
      .unwrap();
      pool.allocate_node(32, 8).unwrap();
    }

    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(SEEN.load(Ordering::SeqCst), 32);
    crate::error::set_leak_handler(prev);
  }
}
