//! Data tree and node model

pub mod node;
pub mod tree;

pub use node::{Children, DataNode, ScalarValue};
pub use tree::{lookup, DataTree};
