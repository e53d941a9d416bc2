use std::io::Read;

use rallocator::debug::DebugConfig;
use rallocator::providers::HeapBlockProvider;
use rallocator::stack::GrowingStack;
use rallocator::{Pool, RawAllocator};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, or just visually track how allocations change block counts.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  // --------------------------------------------------------------------
  // Part 1: growing stack. Bump-allocates through one block, pulling a
  // fresh (larger) block from its arena whenever the current one runs out.
  // --------------------------------------------------------------------
  println!("=== Growing stack ===");
  let mut stack =
    GrowingStack::new(HeapBlockProvider::new(64), true, 0, DebugConfig::default()).expect("failed to build growing stack");
  println!("[start] capacity in current block = {}", stack.capacity());
  block_until_enter_pressed();

  let marker = stack.marker();
  let mut written = Vec::new();
  for i in 0..6u32 {
    let p = stack.allocate(std::mem::size_of::<u32>(), std::mem::align_of::<u32>()).unwrap();
    unsafe { (p as *mut u32).write(i) };
    written.push(p as *mut u32);
    println!("[alloc {i}] wrote {i} at {:?}, capacity left = {}", p, stack.capacity());
  }
  block_until_enter_pressed();

  println!("unwinding to the marker taken before the loop");
  unsafe { stack.unwind(marker) };
  println!("[after unwind] capacity left = {}", stack.capacity());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // Part 2: pool allocator. Fixed node size, refilled from its own arena
  // whenever the free list runs dry; deallocation returns nodes to the
  // list instead of the provider.
  // --------------------------------------------------------------------
  println!("\n=== Pool allocator ===");
  let mut pool = Pool::new(HeapBlockProvider::new(128), 32, true, DebugConfig::default()).expect("failed to build pool");
  println!("[start] pool capacity (free nodes) = {}", pool.capacity());
  block_until_enter_pressed();

  let mut nodes = Vec::new();
  for i in 0..8 {
    let p = pool.allocate_node(32, 8).unwrap();
    nodes.push(p);
    println!("[alloc {i}] node at {:?}, pool capacity = {}", p, pool.capacity());
  }
  block_until_enter_pressed();

  println!("returning every node to the pool");
  for p in nodes {
    unsafe { pool.deallocate_node(p, 32, 8) };
  }
  println!("[after free] pool capacity = {}", pool.capacity());
}
