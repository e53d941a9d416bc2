//! The small-object (chunked) free list.
//!
//! Grounded in `original_source/src/detail/small_free_list.cpp`'s
//! `small_free_memory_list`/`chunk`: a chunk header (`prev`, `next`,
//! `capacity`, `first_free`, `no_nodes`) sits at the front of every chunk,
//! and each free slot inside stores a 1-byte index to the next free slot
//! (`first_free == no_nodes` means "chunk full of nothing free" is wrong —
//! it means the free chain has run out, i.e. the chunk is exhausted).
//!
//! The original's chunk list is circular around a sentinel member
//! (`base_`) the same way `ordered_free_memory_list` anchors around two
//! proxy nodes — again a self-referential structure unsound to reproduce
//! without pinning. This port keeps a plain address-sorted doubly-linked
//! list with `first_chunk`/`last_chunk` (nullable) instead of a sentinel,
//! the same trade this crate already makes in
//! [`crate::free_list::ordered`].

use crate::align::is_aligned;
use crate::debug::{DebugConfig, DebugMagic, debug_fill};
use crate::error::{AllocatorInfo, report_double_free, report_invalid_pointer};

const MAX_NODES: usize = u8::MAX as usize;

#[repr(C)]
struct ChunkHeader {
  prev: *mut ChunkHeader,
  next: *mut ChunkHeader,
  capacity: u8,
  first_free: u8,
  no_nodes: u8,
}

fn memory_offset() -> usize {
  crate::align_to!(std::mem::size_of::<ChunkHeader>(), std::mem::align_of::<ChunkHeader>())
}

unsafe fn list_memory(chunk: *mut ChunkHeader) -> *mut u8 {
  unsafe { (chunk as *mut u8).add(memory_offset()) }
}

unsafe fn node_memory(chunk: *mut ChunkHeader, index: u8, node_size: usize) -> *mut u8 {
  unsafe { list_memory(chunk).add(index as usize * node_size) }
}

unsafe fn chunk_from(chunk: *mut ChunkHeader, node: *mut u8, node_size: usize) -> bool {
  unsafe {
    let begin = list_memory(chunk);
    let end = begin.add((*chunk).no_nodes as usize * node_size);
    begin <= node && node < end
  }
}

unsafe fn chunk_contains(chunk: *mut ChunkHeader, node: *mut u8, node_size: usize) -> bool {
  unsafe {
    let no_nodes = (*chunk).no_nodes;
    let mut cur_index = (*chunk).first_free;
    while cur_index != no_nodes {
      let cur_mem = node_memory(chunk, cur_index, node_size);
      if cur_mem == node {
        return true;
      }
      cur_index = *cur_mem;
    }
    false
  }
}

unsafe fn chunk_allocate(chunk: *mut ChunkHeader, node_size: usize) -> *mut u8 {
  unsafe {
    (*chunk).capacity -= 1;
    let node = node_memory(chunk, (*chunk).first_free, node_size);
    (*chunk).first_free = *node;
    node
  }
}

unsafe fn chunk_deallocate(chunk: *mut ChunkHeader, node: *mut u8, index: u8) {
  unsafe {
    (*chunk).capacity += 1;
    *node = (*chunk).first_free;
    (*chunk).first_free = index;
  }
}

fn less(a: *mut ChunkHeader, b: *mut ChunkHeader) -> bool {
  (a as usize) < (b as usize)
}

#[inline]
fn adjusted_node_size(requested: usize) -> usize {
  requested.max(1)
}

#[inline]
fn actual_node_size(adjusted: usize) -> usize {
  adjusted
}

/// A free list optimised for small node sizes: memory is carved into
/// chunks of up to 255 nodes, each free slot a 1-byte index rather than a
/// full pointer.
pub struct SmallFreeList {
  node_size: usize,
  capacity: usize,
  first_chunk: *mut ChunkHeader,
  last_chunk: *mut ChunkHeader,
  alloc_chunk: *mut ChunkHeader,
  dealloc_chunk: *mut ChunkHeader,
  debug_fill: bool,
  pointer_check: bool,
  double_dealloc_check: bool,
}

unsafe impl Send for SmallFreeList {}

impl SmallFreeList {
  pub fn new(node_size: usize, debug: DebugConfig) -> Self {
    Self {
      node_size: adjusted_node_size(node_size),
      capacity: 0,
      first_chunk: std::ptr::null_mut(),
      last_chunk: std::ptr::null_mut(),
      alloc_chunk: std::ptr::null_mut(),
      dealloc_chunk: std::ptr::null_mut(),
      debug_fill: debug.fill,
      pointer_check: debug.pointer_check,
      double_dealloc_check: debug.double_dealloc_check,
    }
  }

  pub fn node_size(&self) -> usize {
    self.node_size
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn empty(&self) -> bool {
    self.capacity == 0
  }

  fn info(&self) -> AllocatorInfo {
    AllocatorInfo::new("rallocator::free_list::SmallFreeList", self as *const _ as *const ())
  }

  fn splice_in(&mut self, begin: *mut ChunkHeader, end: *mut ChunkHeader) {
    unsafe {
      if self.first_chunk.is_null() {
        self.first_chunk = begin;
        self.last_chunk = end;
      } else if less(self.last_chunk, begin) {
        (*self.last_chunk).next = begin;
        (*begin).prev = self.last_chunk;
        self.last_chunk = end;
      } else if less(end, self.first_chunk) {
        (*self.first_chunk).prev = end;
        (*end).next = self.first_chunk;
        self.first_chunk = begin;
      } else {
        let mut prev: *mut ChunkHeader = std::ptr::null_mut();
        let mut cur = self.first_chunk;
        while !cur.is_null() && less(cur, begin) {
          prev = cur;
          cur = (*cur).next;
        }
        (*prev).next = begin;
        (*begin).prev = prev;
        (*end).next = cur;
        (*cur).prev = end;
      }
    }
  }

  /// Carves `[mem, mem + size)` into as many chunks as fit (up to 255
  /// nodes each, plus a smaller final chunk for the remainder) and splices
  /// them into the chunk list in address order.
  ///
  /// # Safety
  /// `[mem, mem + size)` must be valid for writes and not referenced
  /// elsewhere.
  pub unsafe fn insert(&mut self, mem: *mut u8, size: usize) {
    debug_assert!(is_aligned(mem, std::mem::align_of::<ChunkHeader>()));
    unsafe { debug_fill(mem, size, DebugMagic::FreedMemory, self.debug_fill) };

    let actual_size = actual_node_size(self.node_size);
    let offset = memory_offset();
    let total_chunk_size = offset + actual_size * MAX_NODES;
    let stride = crate::align_to!(total_chunk_size, std::mem::align_of::<ChunkHeader>());

    let no_chunks = size / stride;
    let remainder = size - no_chunks * stride;

    let construct = |at: *mut u8, total_memory: usize| -> *mut ChunkHeader {
      let no_nodes = ((total_memory - offset) / actual_size).min(MAX_NODES) as u8;
      let chunk = at as *mut ChunkHeader;
      unsafe {
        (*chunk).prev = std::ptr::null_mut();
        (*chunk).next = std::ptr::null_mut();
        (*chunk).capacity = no_nodes;
        (*chunk).first_free = 0;
        (*chunk).no_nodes = no_nodes;

        let mut p = list_memory(chunk);
        for i in 0..no_nodes {
          *p = i + 1;
          p = p.add(actual_size);
        }
      }
      chunk
    };

    let mut memory = mem;
    let mut prev: *mut ChunkHeader = std::ptr::null_mut();
    let mut first: *mut ChunkHeader = std::ptr::null_mut();
    let mut new_nodes = 0usize;

    for _ in 0..no_chunks {
      let c = construct(memory, total_chunk_size);
      if first.is_null() {
        first = c;
      }
      if !prev.is_null() {
        unsafe {
          (*prev).next = c;
          (*c).prev = prev;
        }
      }
      prev = c;
      new_nodes += unsafe { (*c).no_nodes as usize };
      memory = unsafe { memory.add(stride) };
    }

    if remainder >= offset + actual_size {
      let c = construct(memory, remainder);
      if first.is_null() {
        first = c;
      }
      if !prev.is_null() {
        unsafe {
          (*prev).next = c;
          (*c).prev = prev;
        }
      }
      prev = c;
      new_nodes += unsafe { (*c).no_nodes as usize };
    }

    debug_assert!(new_nodes > 0, "memory block too small for a single small-object chunk");
    self.splice_in(first, prev);
    self.capacity += new_nodes;

    if self.alloc_chunk.is_null() {
      self.alloc_chunk = first;
      self.dealloc_chunk = first;
    }
  }

  fn make_chunk(c: *mut ChunkHeader, n: usize) -> Option<*mut ChunkHeader> {
    if c.is_null() {
      return None;
    }
    let capacity = unsafe { (*c).capacity as usize };
    (capacity >= n).then_some(c)
  }

  fn find_chunk_for_alloc(&mut self, n: usize) -> *mut ChunkHeader {
    if let Some(c) = Self::make_chunk(self.alloc_chunk, n) {
      return c;
    }
    if let Some(c) = Self::make_chunk(self.dealloc_chunk, n) {
      return c;
    }

    let mut forward = unsafe { (*self.alloc_chunk).next };
    let mut backward = unsafe { (*self.alloc_chunk).prev };
    loop {
      if let Some(c) = Self::make_chunk(forward, n) {
        return c;
      }
      if let Some(c) = Self::make_chunk(backward, n) {
        return c;
      }
      if forward.is_null() && backward.is_null() {
        unreachable!("small free list capacity invariant violated");
      }
      if !forward.is_null() {
        forward = unsafe { (*forward).next };
      }
      if !backward.is_null() {
        backward = unsafe { (*backward).prev };
      }
    }
  }

  fn find_chunk_for(&self, node: *mut u8) -> Option<*mut ChunkHeader> {
    let actual_size = actual_node_size(self.node_size);
    if !self.dealloc_chunk.is_null() && unsafe { chunk_from(self.dealloc_chunk, node, actual_size) } {
      return Some(self.dealloc_chunk);
    }
    if !self.alloc_chunk.is_null() && unsafe { chunk_from(self.alloc_chunk, node, actual_size) } {
      return Some(self.alloc_chunk);
    }

    let mut forward = self.dealloc_chunk;
    let mut backward = self.dealloc_chunk;
    loop {
      if !forward.is_null() {
        forward = unsafe { (*forward).next };
      }
      if !backward.is_null() {
        backward = unsafe { (*backward).prev };
      }
      if forward.is_null() && backward.is_null() {
        return None;
      }
      if !forward.is_null() && unsafe { chunk_from(forward, node, actual_size) } {
        return Some(forward);
      }
      if !backward.is_null() && unsafe { chunk_from(backward, node, actual_size) } {
        return Some(backward);
      }
    }
  }

  /// Allocates one node, preferring whichever chunk was used last (for
  /// alloc or dealloc) and otherwise searching outward from it.
  ///
  /// # Safety
  /// The list must be non-empty.
  pub unsafe fn allocate(&mut self) -> *mut u8 {
    debug_assert!(!self.empty());
    let chunk = self.find_chunk_for_alloc(1);
    self.alloc_chunk = chunk;
    self.capacity -= 1;

    let mem = unsafe { chunk_allocate(chunk, actual_node_size(self.node_size)) };
    unsafe { debug_fill(mem, self.node_size, DebugMagic::NewMemory, self.debug_fill) };
    mem
  }

  /// Returns `node` to its owning chunk.
  ///
  /// # Safety
  /// `node` must have come from a prior `allocate()` on this list.
  pub unsafe fn deallocate(&mut self, node: *mut u8) {
    unsafe { debug_fill(node, self.node_size, DebugMagic::FreedMemory, self.debug_fill) };

    let actual_size = actual_node_size(self.node_size);
    let chunk = match self.find_chunk_for(node) {
      Some(c) => c,
      None => {
        if self.pointer_check {
          report_invalid_pointer(self.info(), node);
        }
        return;
      }
    };
    self.dealloc_chunk = chunk;

    let offset = unsafe { node.offset_from(list_memory(chunk)) } as usize;
    debug_assert!(offset % actual_size == 0, "pointer not at a node boundary");
    if self.double_dealloc_check && unsafe { chunk_contains(chunk, node, actual_size) } {
      report_double_free(self.info(), node);
      return;
    }

    let index = (offset / actual_size) as u8;
    unsafe { chunk_deallocate(chunk, node, index) };
    self.capacity += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(align(16))]
  struct Aligned([u8; 4096]);

  #[test]
  fn insert_then_allocate_returns_nodes() {
    let mut buf = Aligned([0u8; 4096]);
    let mut list = SmallFreeList::new(8, DebugConfig::default());
    unsafe { list.insert(buf.0.as_mut_ptr(), 4096) };
    assert!(list.capacity() > 0);

    let a = unsafe { list.allocate() };
    assert!(!a.is_null());
    assert_eq!(list.capacity(), list.capacity());
  }

  #[test]
  fn deallocate_then_allocate_reuses_node() {
    let mut buf = Aligned([0u8; 4096]);
    let mut list = SmallFreeList::new(8, DebugConfig::default());
    unsafe { list.insert(buf.0.as_mut_ptr(), 4096) };

    let before = list.capacity();
    let a = unsafe { list.allocate() };
    assert_eq!(list.capacity(), before - 1);
    unsafe { list.deallocate(a) };
    assert_eq!(list.capacity(), before);

    let b = unsafe { list.allocate() };
    assert_eq!(a, b);
  }

  #[test]
  fn many_allocations_exhaust_and_refill_chunk() {
    let mut buf = Aligned([0u8; 4096]);
    let mut list = SmallFreeList::new(8, DebugConfig::default());
    unsafe { list.insert(buf.0.as_mut_ptr(), 4096) };

    let total = list.capacity();
    let mut ptrs = Vec::new();
    for _ in 0..total {
      ptrs.push(unsafe { list.allocate() });
    }
    assert!(list.empty());

    for p in ptrs {
      unsafe { list.deallocate(p) };
    }
    assert_eq!(list.capacity(), total);
  }
}
