//! Abstract syntax tree for bash scripts.

pub mod node;

pub use node::*;
