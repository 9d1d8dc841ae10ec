//! Lazily resolved composite tree: node arena, load state machine, ordering
//! and the flattened view consumed by virtualized renderers.

mod base;
mod flatten;
mod node;
mod registry;
mod sort;

pub use base::{ResolveChildren, Tree};
pub use flatten::FlatItem;
pub use node::{Branch, LoadState, NewNode, NodeId, TreeNode};
pub use registry::NodeRegistry;
pub use sort::{default_sort_comparator, natural_cmp, SortMode, SortOptions};
