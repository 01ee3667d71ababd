//! Update Flush
//!
//! Propagates the entry tags collected since the last flush to every
//! operation that transitively depends on them.
//!
//! # Algorithm
//!
//! 1. Apply a pending time source tag to its dependents.
//! 2. Reset the per-pass scratch state of every node (in parallel).
//! 3. Seed a queue with the entry tags.
//! 4. Drain the queue. Each operation gets `NEEDS_UPDATE`; its ID is marked
//!    modified and, the first time a component is reached, all of the
//!    component's operations are tagged too. Children reachable through
//!    flushable relations are scheduled. The first unscheduled child is
//!    processed next without a queue round-trip, the others go to the front
//!    of the queue.
//! 5. Accumulate recalc flags on each modified ID and notify the observer.
//!
//! Each operation is scheduled at most once per pass, so the walk is finite
//! on cyclic graphs and every operation is visited at most once.

use std::collections::VecDeque;

use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::id::IdRecalc;
use crate::node::{
    ComponentIndex, ComponentState, IdNodeIndex, IdState, Node, NodeHandle, NodeType, OperationCode, OperationFlag,
    OperationIndex,
};

use super::{mark_id_type_updated, Graph, UpdateSource};

type FlushQueue = VecDeque<OperationIndex>;

/// Outcome of one [`Graph::flush_updates`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Operations visited by the walk, entry tags included.
    pub operations_visited: usize,
    /// IDs with at least one visited operation.
    pub ids_modified: usize,
}

impl Graph {
    /// Flush all pending tags through the graph.
    ///
    /// Entry tags are consumed. Flags set on operations stay until the
    /// executor clears them with [`Graph::mark_operation_evaluated`].
    pub fn flush_updates(&mut self) -> FlushSummary {
        self.flush_updates_with(|_| {})
    }

    /// Like [`flush_updates`](Self::flush_updates), calling `visit` once for
    /// every operation the walk reaches.
    pub fn flush_updates_with<F>(&mut self, mut visit: F) -> FlushSummary
    where
        F: FnMut(OperationIndex),
    {
        self.flush_time_source();
        if self.entry_tags.is_empty() {
            trace!("no entry tags, nothing to flush");
            return FlushSummary::default();
        }

        self.flush_prepare();
        let mut queue = FlushQueue::new();
        self.flush_schedule_entrypoints(&mut queue);

        let mut operations_visited = 0;
        while let Some(first) = queue.pop_front() {
            let mut current = Some(first);
            while let Some(op_index) = current {
                trace!(operation = op_index.index(), "flushing operation");
                visit(op_index);
                operations_visited += 1;

                let op = &mut self.operations[op_index.index()];
                op.flag |= OperationFlag::NEEDS_UPDATE;
                let component = op.owner();
                let id = self.components[component.index()].owner();
                self.id_nodes[id.index()].custom_flags = IdState::Modified;

                self.flush_handle_component_node(component, &mut queue);
                current = self.flush_schedule_children(op_index, &mut queue);
            }
        }

        let ids_modified = self.flush_editors_id_update();
        self.entry_tags.clear();

        debug!(operations_visited, ids_modified, "flushed updates");
        FlushSummary {
            operations_visited,
            ids_modified,
        }
    }

    fn flush_time_source(&mut self) {
        if !self.time_source.tagged_for_update {
            return;
        }
        self.time_source.tagged_for_update = false;
        let targets: SmallVec<[OperationIndex; 8]> = self
            .time_source
            .outlinks
            .iter()
            .filter_map(|rel| match self.relations[rel.index()].to() {
                NodeHandle::Operation(op) => Some(op),
                NodeHandle::TimeSource => None,
            })
            .collect();
        trace!(dependents = targets.len(), "flushing time source");
        for op in targets {
            self.tag_operation(op, UpdateSource::Time);
        }
    }

    fn flush_prepare(&mut self) {
        let grain = self.context.parallel_reset_grain.max(1);
        self.operations
            .par_iter_mut()
            .with_min_len(grain)
            .for_each(|op| op.scheduled = false);
        self.id_nodes
            .par_iter_mut()
            .with_min_len(grain)
            .for_each(|id_node| id_node.custom_flags = IdState::None);
        self.components
            .par_iter_mut()
            .with_min_len(grain)
            .for_each(|component| component.custom_flags = ComponentState::None);
    }

    fn flush_schedule_entrypoints(&mut self, queue: &mut FlushQueue) {
        for &op in &self.entry_tags {
            let node = &mut self.operations[op.index()];
            if node.scheduled {
                continue;
            }
            node.scheduled = true;
            queue.push_back(op);
        }
    }

    fn flush_handle_component_node(&mut self, component: ComponentIndex, queue: &mut FlushQueue) {
        let comp = &mut self.components[component.index()];
        if comp.custom_flags == ComponentState::Done {
            return;
        }
        comp.custom_flags = ComponentState::Done;

        let node_type = comp.node_type();
        // Particle components only re-run operations reached through relations.
        if !matches!(node_type, NodeType::ParticleSettings | NodeType::ParticleSystem) {
            let is_geometry = node_type == NodeType::Geometry;
            for op in comp.operations() {
                let op = &mut self.operations[op.index()];
                // Visibility is driven by the object, not by geometry changes.
                if is_geometry && op.opcode() == OperationCode::Visibility {
                    continue;
                }
                op.flag |= OperationFlag::NEEDS_UPDATE;
            }
        }

        // A changed bone needs the whole pose re-evaluated.
        if node_type == NodeType::Bone {
            let owner = comp.owner();
            self.flush_schedule_pose(owner, queue);
        }
    }

    fn flush_schedule_pose(&mut self, owner: IdNodeIndex, queue: &mut FlushQueue) {
        let Some(pose) = self.id_nodes[owner.index()].find_component(NodeType::EvalPose, "") else {
            warn!(id = %self.id_nodes[owner.index()].id_orig(), "bone component without pose evaluation");
            return;
        };
        let pose = &mut self.components[pose.index()];
        if pose.custom_flags != ComponentState::None {
            return;
        }
        let Some(entry) = pose.entry_operation() else {
            warn!(id = %self.id_nodes[owner.index()].id_orig(), "pose evaluation has no entry operation");
            return;
        };
        pose.custom_flags = ComponentState::Scheduled;
        let entry_node = &mut self.operations[entry.index()];
        if !entry_node.scheduled {
            entry_node.scheduled = true;
            queue.push_front(entry);
        }
    }

    /// Schedule the flushable children of `op_index`. Returns the child to
    /// process next.
    fn flush_schedule_children(&mut self, op_index: OperationIndex, queue: &mut FlushQueue) -> Option<OperationIndex> {
        let flag = self.operations[op_index.index()].flag;
        let user_modified = flag.contains(OperationFlag::USER_MODIFIED);
        let mut next = None;
        for i in 0..self.operations[op_index.index()].outlinks.len() {
            let rel = &self.relations[self.operations[op_index.index()].outlinks[i].index()];
            if !rel.allows_flush(user_modified) {
                continue;
            }
            let NodeHandle::Operation(to) = rel.to() else {
                continue;
            };
            let child = &mut self.operations[to.index()];
            child.flag |= flag & OperationFlag::FLUSH;
            if child.scheduled {
                continue;
            }
            child.scheduled = true;
            if next.is_none() {
                next = Some(to);
            } else {
                queue.push_front(to);
            }
        }
        next
    }

    /// Accumulate recalc flags on modified IDs and notify editors. Returns
    /// the number of modified IDs.
    fn flush_editors_id_update(&mut self) -> usize {
        let observer = self.context.observer.clone();
        let is_active = self.context.is_active;
        let mut modified = 0;
        for id_node in &mut self.id_nodes {
            if id_node.custom_flags != IdState::Modified {
                continue;
            }
            modified += 1;
            mark_id_type_updated(&mut self.id_type_updated, id_node.id_type());

            let mut recalc = IdRecalc::empty();
            for component in id_node.components() {
                let component = &self.components[component.index()];
                if component.custom_flags == ComponentState::Done {
                    recalc |= component.id_recalc_tag();
                }
            }
            // Fresh copies are evaluated in full, nobody displays them yet.
            let was_expanded = id_node.id_cow.is_expanded();
            id_node.id_cow.add_recalc(recalc);
            if was_expanded && is_active {
                if let Some(observer) = &observer {
                    observer.id_updated(id_node.id_orig(), id_node.id_cow.recalc());
                }
            }
        }
        modified
    }
}
