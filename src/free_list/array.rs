//! Size-class-bucketed array of free lists.
//!
//! Grounded in the bucketing scheme `memory_pool_collection.hpp`'s
//! `node_size_table`/bucket lookup implies (that header itself is not
//! among the retrieved sources, only its callers). `ilog2_ceil` is this
//! crate's own name for the "round the base-2 log up" bucketing rule.

use crate::debug::DebugConfig;
use crate::error::{AllocatorError, AllocatorInfo, Result};
use crate::free_list::FreeList;

/// `⌈log₂ s⌉`, with `ilog2_ceil(0) = ilog2_ceil(1) = 0`.
fn ilog2_ceil(s: usize) -> u32 {
  if s <= 1 {
    0
  } else {
    usize::BITS - (s - 1).leading_zeros()
  }
}

/// `min_node_size · 2^max(0, ⌈log₂ max_node_size⌉ − ⌈log₂ min_node_size⌉)`
/// buckets of free lists, one per size class.
pub struct FreeListArray<T> {
  lists: Vec<T>,
  min_node_size: usize,
  max_node_size: usize,
  min_log2: u32,
}

impl<T: FreeList> FreeListArray<T> {
  /// `min_node_size` must be a power of two: `size_of(index)` computes each
  /// bucket's node size as `min_node_size << index`, which only upper-bounds
  /// every size that maps to that bucket (`size_of(index(s)) >= s`) when
  /// `min_node_size` itself is a power of two.
  pub fn new(min_node_size: usize, max_node_size: usize, debug: DebugConfig) -> Self {
    debug_assert!(min_node_size > 0 && max_node_size >= min_node_size);
    debug_assert!(min_node_size.is_power_of_two(), "min_node_size must be a power of two");
    let min_log2 = ilog2_ceil(min_node_size);
    let max_log2 = ilog2_ceil(max_node_size);
    let bucket_count = (max_log2 - min_log2) as usize + 1;
    let lists = (0..bucket_count).map(|i| T::new(min_node_size << i, debug)).collect();
    Self { lists, min_node_size, max_node_size, min_log2 }
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::free_list::FreeListArray", self as *const _ as *const ())
  }

  /// `index(s) = max(0, ⌈log₂ s⌉ − ⌈log₂ min_node_size⌉)`.
  pub fn index(&self, size: usize) -> usize {
    ilog2_ceil(size.max(1)).saturating_sub(self.min_log2) as usize
  }

  /// The node size managed by bucket `index`.
  pub fn size_of(&self, index: usize) -> usize {
    self.min_node_size << index
  }

  pub fn min_node_size(&self) -> usize {
    self.min_node_size
  }

  pub fn max_node_size(&self) -> usize {
    self.max_node_size
  }

  pub fn bucket_count(&self) -> usize {
    self.lists.len()
  }

  pub fn get(&self, index: usize) -> &T {
    &self.lists[index]
  }

  pub fn get_mut(&mut self, index: usize) -> &mut T {
    &mut self.lists[index]
  }

  /// `index(size)`, rejecting requests above `max_node_size`.
  pub fn bucket_for(&self, size: usize) -> Result<usize> {
    if size > self.max_node_size {
      return Err(crate::error::report_bad_size(
        self.info(),
        crate::error::SizeKind::Node,
        size,
        self.max_node_size,
      ));
    }
    Ok(self.index(size))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::free_list::IntrusiveFreeList;

  #[test]
  fn index_is_monotone_in_size() {
    let arr: FreeListArray<IntrusiveFreeList> = FreeListArray::new(8, 4096, DebugConfig::default());
    let mut last = 0;
    for size in [8usize, 16, 17, 100, 1000, 4096] {
      let idx = arr.index(size);
      assert!(idx >= last);
      last = idx;
    }
  }

  #[test]
  fn size_of_index_doubles_each_bucket() {
    let arr: FreeListArray<IntrusiveFreeList> = FreeListArray::new(8, 64, DebugConfig::default());
    assert_eq!(arr.size_of(0), 8);
    assert_eq!(arr.size_of(1), 16);
    assert_eq!(arr.size_of(arr.bucket_count() - 1), 64);
  }

  #[test]
  fn bucket_count_spans_min_to_max() {
    let arr: FreeListArray<IntrusiveFreeList> = FreeListArray::new(16, 16, DebugConfig::default());
    assert_eq!(arr.bucket_count(), 1);
  }

  #[test]
  #[should_panic(expected = "power of two")]
  #[cfg(debug_assertions)]
  fn non_power_of_two_min_node_size_is_rejected() {
    let _: FreeListArray<IntrusiveFreeList> = FreeListArray::new(24, 64, DebugConfig::default());
  }
}
