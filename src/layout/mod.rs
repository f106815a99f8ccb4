//! Display-side placement of incoming shots.

mod allocator;

pub use allocator::{DisplaySlot, LayoutAllocator, Placement};
