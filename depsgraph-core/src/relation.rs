//! Relations
//!
//! A relation is a directed dependency edge: `to` must be evaluated after
//! `from`, and an update of `from` is flushed to `to` unless the relation's
//! flags forbid it.
//!
//! Relations are allocated in the graph's relation arena and registered on
//! both endpoints when created. They are never removed individually; the
//! arena is dropped as a whole together with the graph's nodes.

use bitflags::bitflags;

use crate::node::NodeHandle;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RelationFlag: u8 {
        /// Closes a dependency cycle. Set by cycle detection.
        const CYCLIC = 1 << 0;
        /// Never propagate updates across this relation.
        const NO_FLUSH = 1 << 1;
        /// Propagate only updates coming from a user edit.
        const FLUSH_USER_EDIT_ONLY = 1 << 2;
        /// Ordering override for special-cased evaluation.
        const GODMODE = 1 << 4;
        /// Reuse an existing relation with the same endpoints and name.
        const CHECK_BEFORE_ADD = 1 << 5;
    }
}

#[derive(Debug, Clone)]
pub struct Relation {
    from: NodeHandle,
    to: NodeHandle,
    /// Description. Used for duplicate detection and diagnostics only.
    name: String,
    pub(crate) flag: RelationFlag,
}

impl Relation {
    pub(crate) fn new(from: NodeHandle, to: NodeHandle, name: &str, flag: RelationFlag) -> Self {
        Self {
            from,
            to,
            name: name.to_owned(),
            flag,
        }
    }

    pub fn from(&self) -> NodeHandle {
        self.from
    }

    pub fn to(&self) -> NodeHandle {
        self.to
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> RelationFlag {
        self.flag
    }

    pub fn is_cyclic(&self) -> bool {
        self.flag.contains(RelationFlag::CYCLIC)
    }

    /// Whether an update of an operation with the given user-modified state
    /// may cross this relation.
    pub fn allows_flush(&self, from_user_modified: bool) -> bool {
        if self.flag.contains(RelationFlag::NO_FLUSH) {
            return false;
        }
        if self.flag.contains(RelationFlag::FLUSH_USER_EDIT_ONLY) && !from_user_modified {
            return false;
        }
        true
    }
}
