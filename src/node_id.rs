//! Identifier assigned to each node when it joins a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Ids are sequential per pipeline, `Copy`, and hashable; they show up in
//! log fields and make it easy to key per-node bookkeeping.

use std::fmt;

/// Unique numeric identifier for a node in a pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn new(v: u64) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
