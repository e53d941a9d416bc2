//! Raw pointer-as-storage helpers shared by the three free-list flavours.
//!
//! Grounded in `original_source/src/detail/free_list_utils.hpp`: reading and
//! writing a pointer-sized integer through an unaligned-agnostic `memcpy` in
//! the original becomes a plain unaligned pointer read/write here, and the
//! XOR-linked-list primitives (`xor_list_get_other`, `xor_list_set`,
//! `xor_list_change`, `xor_list_insert`, `xor_list_iter_next`) are ported
//! one-to-one.

#[inline]
pub unsafe fn get_int(address: *const u8) -> usize {
  unsafe { address.cast::<usize>().read_unaligned() }
}

#[inline]
pub unsafe fn set_int(address: *mut u8, value: usize) {
  unsafe { address.cast::<usize>().write_unaligned(value) };
}

/// Reads a plain intrusive-list "next" pointer stored at `address`.
#[inline]
pub unsafe fn list_get_next(address: *const u8) -> *mut u8 {
  unsafe { get_int(address) as *mut u8 }
}

/// Writes a plain intrusive-list "next" pointer at `address`.
#[inline]
pub unsafe fn list_set_next(address: *mut u8, next: *mut u8) {
  unsafe { set_int(address, next as usize) };
}

/// Given one known neighbour, returns the other one stored in the
/// `prev ^ next` word at `address`.
#[inline]
pub unsafe fn xor_get_other(address: *const u8, known: *mut u8) -> *mut u8 {
  unsafe { (get_int(address) ^ (known as usize)) as *mut u8 }
}

/// Stores `prev ^ next` at `address` (order does not matter).
#[inline]
pub unsafe fn xor_set(address: *mut u8, prev: *mut u8, next: *mut u8) {
  unsafe { set_int(address, (prev as usize) ^ (next as usize)) };
}

/// Replaces `old` with `new_ptr` in the pair stored at `address`.
#[inline]
pub unsafe fn xor_change(address: *mut u8, old: *mut u8, new_ptr: *mut u8) {
  let other = unsafe { xor_get_other(address, old) };
  unsafe { xor_set(address, other, new_ptr) };
}

/// Advances `(cur, prev)` one step forward through an XOR-linked list.
#[inline]
pub unsafe fn xor_iter_next(cur: &mut *mut u8, prev: &mut *mut u8) {
  let next = unsafe { xor_get_other(*cur, *prev) };
  *prev = *cur;
  *cur = next;
}

/// Splices `new_node` between `prev` and `next`, fixing up all three words.
#[inline]
pub unsafe fn xor_insert(new_node: *mut u8, prev: *mut u8, next: *mut u8) {
  unsafe {
    xor_set(new_node, prev, next);
    xor_change(prev, next, new_node);
    xor_change(next, prev, new_node);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_list_roundtrips_pointer() {
    let mut word: usize = 0;
    let addr = &mut word as *mut usize as *mut u8;
    let target = 0x1234usize as *mut u8;
    unsafe {
      list_set_next(addr, target);
      assert_eq!(list_get_next(addr), target);
    }
  }

  #[test]
  fn xor_link_recovers_both_neighbours() {
    let mut word: usize = 0;
    let addr = &mut word as *mut usize as *mut u8;
    let a = 0x1000usize as *mut u8;
    let b = 0x2000usize as *mut u8;
    unsafe {
      xor_set(addr, a, b);
      assert_eq!(xor_get_other(addr, a), b);
      assert_eq!(xor_get_other(addr, b), a);
    }
  }
}
