//! Bump-pointer stack allocators: a [`fixed::FixedStack`] bumping through a
//! single block, and a [`growing::GrowingStack`] that pulls new blocks from
//! an arena as needed.

pub mod fixed;
pub mod growing;

pub use fixed::{FixedStack, StackMarker};
pub use growing::{GrowingStack, Marker as GrowingMarker};
