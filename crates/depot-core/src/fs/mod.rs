//! Filesystem helpers shared across features.

pub mod canonical;
pub mod tree_digest;

pub use canonical::{is_within, resolve_path};
pub use tree_digest::digest_tree;
