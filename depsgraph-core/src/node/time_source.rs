//! Time Source
//!
//! Every graph has exactly one time source. Operations that depend on the
//! current frame are connected to it, and a frame change tags the time source
//! instead of each of those operations.

use smallvec::SmallVec;

use super::{Node, NodeType, RelationIndex};

#[derive(Debug, Default)]
pub struct TimeSourceNode {
    pub(crate) tagged_for_update: bool,
    pub(crate) outlinks: SmallVec<[RelationIndex; 4]>,
}

impl TimeSourceNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tagged_for_update(&self) -> bool {
        self.tagged_for_update
    }

    pub fn outlinks(&self) -> &[RelationIndex] {
        &self.outlinks
    }

    pub(crate) fn tag_update(&mut self) {
        self.tagged_for_update = true;
    }
}

impl Node for TimeSourceNode {
    fn node_type(&self) -> NodeType {
        NodeType::TimeSource
    }

    fn name(&self) -> &str {
        "Time Source"
    }

    fn identifier(&self) -> String {
        format!("{} : {}", NodeType::TimeSource, self.name())
    }
}
