//! # rallocator — user-space arena, stack and pool allocators
//!
//! A library of composable, single-threaded memory allocators, none of
//! which talk to the global allocator directly: each one obtains coarse
//! [`Block`](block::Block)s from a pluggable [`BlockProvider`](block::BlockProvider)
//! and subdivides them according to its own strategy.
//!
//! ## Crate structure
//!
//! ```text
//!   rallocator
//!   ├── align            - alignment macros and helpers
//!   ├── debug            - fence/fill instrumentation, leak tracking
//!   ├── error            - error taxonomy + global handler registry
//!   ├── block            - Block, BlockProvider
//!   ├── providers         - heap/virtual-memory/static-buffer BlockProviders
//!   ├── arena            - block arena (used/cached block stacks)
//!   ├── stack            - fixed and growing bump allocators
//!   ├── iteration        - N-region round-robin bump allocator
//!   ├── free_list        - intrusive, ordered and small-object free lists
//!   │                      plus the size-bucketed free-list array
//!   ├── traits           - the RawAllocator / ComposableAllocator layer
//!   ├── pool             - single-size-class pool (arena + ordered list)
//!   └── pool_collection  - size-bucketed collection of pools
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use rallocator::debug::DebugConfig;
//! use rallocator::providers::HeapBlockProvider;
//! use rallocator::stack::GrowingStack;
//!
//! let mut stack = GrowingStack::new(HeapBlockProvider::new(4096), true, 0, DebugConfig::default()).unwrap();
//! let marker = stack.marker();
//! let p = stack.allocate(64, 8).unwrap();
//! assert!(!p.is_null());
//! unsafe { stack.unwind(marker) };
//! ```
//!
//! ## Safety
//!
//! Every allocator here manages raw memory directly; `allocate`/`insert`
//! return raw pointers and `deallocate`/`unwind` are `unsafe` because they
//! trust the caller to pass back exactly what was handed out. None of the
//! types here are `Sync`; share one across threads only behind an external
//! lock.

pub mod align;
pub mod arena;
pub mod block;
pub mod debug;
pub mod error;
pub mod free_list;
pub mod iteration;
pub mod pool;
pub mod pool_collection;
pub mod providers;
pub mod stack;
pub mod traits;

pub use arena::Arena;
pub use block::{Block, BlockProvider};
pub use debug::DebugConfig;
pub use error::{AllocatorError, AllocatorInfo, Result};
pub use iteration::IterationStack;
pub use pool::Pool;
pub use pool_collection::PoolCollection;
pub use traits::{ComposableAllocator, RawAllocator};
