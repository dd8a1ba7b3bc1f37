//! Upstream flow sources

pub mod tail;

pub use tail::FlowTail;
