//! Visibility Flush
//!
//! A component matters for display if its ID is visible, or if anything
//! visible depends on it. The second part is computed by walking relations
//! backwards in reverse topological order, so a dependency inherits the
//! visibility of everything downstream of it.

use tracing::debug;

use crate::node::{IdComponentsMask, Node, NodeHandle, NodeType};

use super::Graph;

impl Graph {
    /// Finish a build: flag cycles, propagate visibility and recompute the
    /// visible component masks. Returns the number of cycles found.
    pub fn finalize_build(&mut self) -> usize {
        let num_cycles = self.detect_cycles();
        self.flush_visibility();

        for id_node in &mut self.id_nodes {
            let mut mask: IdComponentsMask = 0;
            for component in id_node.components() {
                let component = &self.components[component.index()];
                if component.possibly_affects_visible_id {
                    mask |= 1 << component.node_type() as u32;
                }
            }
            id_node.update_visible_components_mask(mask);
        }

        debug!(
            id_nodes = self.id_nodes.len(),
            operations = self.operations.len(),
            relations = self.relations.len(),
            num_cycles,
            "finalized build"
        );
        num_cycles
    }

    /// Propagate component visibility from dependents to dependencies.
    /// Cyclic relations are ignored, so cycles must already be flagged.
    pub(crate) fn flush_visibility(&mut self) {
        for component in &mut self.components {
            let id_node = &self.id_nodes[component.owner().index()];
            if component.node_type() == NodeType::Synchronization {
                // Results are copied back to the original, always needed.
                component.possibly_affects_visible_id = true;
                component.affects_visible_id = true;
            } else {
                component.possibly_affects_visible_id = id_node.is_visible_on_build;
                component.affects_visible_id = id_node.is_visible_on_build && id_node.is_enabled_on_eval;
            }
        }

        let count = self.operations.len();
        let mut num_pending = vec![0usize; count];
        let mut stack = Vec::new();
        for (index, op) in self.operations.iter().enumerate() {
            num_pending[index] = op
                .outlinks
                .iter()
                .filter(|rel| !self.relations[rel.index()].is_cyclic())
                .count();
            if num_pending[index] == 0 {
                stack.push(index);
            }
        }

        while let Some(index) = stack.pop() {
            let op = &self.operations[index];
            let component = &self.components[op.owner().index()];
            let (possibly, affects) = (component.possibly_affects_visible_id, component.affects_visible_id);

            for rel in op.inlinks.iter() {
                let rel = &self.relations[rel.index()];
                let NodeHandle::Operation(from) = rel.from() else {
                    continue;
                };
                let from_component = &mut self.components[self.operations[from.index()].owner().index()];
                from_component.possibly_affects_visible_id |= possibly;
                from_component.affects_visible_id |= affects;

                if rel.is_cyclic() {
                    continue;
                }
                let pending = &mut num_pending[from.index()];
                debug_assert!(*pending > 0);
                *pending -= 1;
                if *pending == 0 {
                    stack.push(from.index());
                }
            }
        }
    }
}
