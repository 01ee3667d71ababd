//! Cycle Detection
//!
//! Dependency cycles are legal but unschedulable. Detection runs once per
//! build, flags the relation that closes each cycle as
//! [`RelationFlag::CYCLIC`] and logs the path so users can fix their setup.
//!
//! # Algorithm
//!
//! Iterative depth-first search with an explicit stack. The search starts
//! from operations without operation inlinks, then from every operation not
//! reached yet, so isolated strongly connected components are covered. An
//! edge into an operation currently on the stack is a back edge.

use tracing::warn;

use crate::node::{NodeHandle, OperationIndex, RelationIndex};
use crate::relation::RelationFlag;

use super::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    NotVisited,
    InStack,
    Visited,
}

/// One DFS frame. The frame below it on the stack is the operation it was
/// reached from.
struct StackEntry {
    node: OperationIndex,
    via: Option<RelationIndex>,
    next_child: usize,
}

impl Graph {
    /// Flag every relation closing a dependency cycle. Returns the number of
    /// cycles found.
    pub fn detect_cycles(&mut self) -> usize {
        let count = self.operations.len();
        let mut state = vec![VisitState::NotVisited; count];
        let mut stack = Vec::new();
        let mut num_cycles = 0;

        for index in 0..count {
            let has_operation_inlinks = self.operations[index]
                .inlinks
                .iter()
                .any(|rel| matches!(self.relations[rel.index()].from(), NodeHandle::Operation(_)));
            if !has_operation_inlinks {
                num_cycles += self.solve_cycles(OperationIndex::new(index), &mut state, &mut stack);
            }
        }
        // Whatever is left is only reachable from inside a cycle.
        for index in 0..count {
            if state[index] == VisitState::NotVisited {
                num_cycles += self.solve_cycles(OperationIndex::new(index), &mut state, &mut stack);
            }
        }
        num_cycles
    }

    fn solve_cycles(
        &mut self,
        root: OperationIndex,
        state: &mut [VisitState],
        stack: &mut Vec<StackEntry>,
    ) -> usize {
        state[root.index()] = VisitState::InStack;
        stack.push(StackEntry {
            node: root,
            via: None,
            next_child: 0,
        });

        let mut num_cycles = 0;
        while let Some(top) = stack.last_mut() {
            let node = top.node;
            let child = top.next_child;
            let outlinks = &self.operations[node.index()].outlinks;
            if child >= outlinks.len() {
                state[node.index()] = VisitState::Visited;
                stack.pop();
                continue;
            }
            top.next_child += 1;

            let rel = outlinks[child];
            let NodeHandle::Operation(to) = self.relations[rel.index()].to() else {
                continue;
            };
            match state[to.index()] {
                VisitState::NotVisited => {
                    state[to.index()] = VisitState::InStack;
                    stack.push(StackEntry {
                        node: to,
                        via: Some(rel),
                        next_child: 0,
                    });
                }
                VisitState::InStack => {
                    warn!(cycle = %self.describe_cycle(stack, to, rel), "dependency cycle detected");
                    self.relations[rel.index()].flag |= RelationFlag::CYCLIC;
                    num_cycles += 1;
                }
                VisitState::Visited => {}
            }
        }
        num_cycles
    }

    /// Human readable path of the cycle closed by `closing` into `to`.
    fn describe_cycle(&self, stack: &[StackEntry], to: OperationIndex, closing: RelationIndex) -> String {
        let mut path = format!("\n  {} depends on", self.full_identifier(to));
        let Some(mut position) = stack.len().checked_sub(1) else {
            return path;
        };
        path += &format!(
            "\n  {} via '{}'",
            self.full_identifier(stack[position].node),
            self.relations[closing.index()].name()
        );
        while stack[position].node != to && position > 0 {
            let via = stack[position].via.map_or("", |rel| self.relations[rel.index()].name());
            position -= 1;
            path += &format!("\n  {} via '{}'", self.full_identifier(stack[position].node), via);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphContext;
    use crate::id::{IdType, OriginalId};
    use crate::node::{ComponentIndex, NodeType, OperationCode, OperationKey};

    fn graph_with_ops(count: usize) -> (Graph, Vec<OperationIndex>) {
        let mut graph = Graph::new(GraphContext::default());
        let id = graph.add_id_node(&OriginalId::new(1, IdType::Object, "Cube"));
        let comp: ComponentIndex = graph.add_component(id, NodeType::Parameters, "");
        let ops = (0..count)
            .map(|i| graph.add_operation(comp, None, OperationKey::new(OperationCode::IdProperty, format!("p{i}"), -1)))
            .collect();
        (graph, ops)
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let (mut graph, ops) = graph_with_ops(4);
        graph.add_operation_relation(ops[0], ops[1], "0 -> 1", RelationFlag::empty());
        graph.add_operation_relation(ops[0], ops[2], "0 -> 2", RelationFlag::empty());
        graph.add_operation_relation(ops[1], ops[3], "1 -> 3", RelationFlag::empty());
        graph.add_operation_relation(ops[2], ops[3], "2 -> 3", RelationFlag::empty());

        assert_eq!(graph.detect_cycles(), 0);
        assert!(graph.relations().all(|(_, rel)| !rel.is_cyclic()));
    }

    #[test]
    fn back_edge_is_flagged() {
        let (mut graph, ops) = graph_with_ops(3);
        let forward = graph.add_operation_relation(ops[0], ops[1], "A -> B", RelationFlag::empty());
        let back = graph.add_operation_relation(ops[1], ops[0], "B -> A", RelationFlag::empty());
        let sink = graph.add_operation_relation(ops[1], ops[2], "B -> C", RelationFlag::empty());

        assert_eq!(graph.detect_cycles(), 1);
        assert!(!graph.relation(forward).is_cyclic());
        assert!(graph.relation(back).is_cyclic());
        assert!(!graph.relation(sink).is_cyclic());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let (mut graph, ops) = graph_with_ops(1);
        let rel = graph.add_operation_relation(ops[0], ops[0], "self", RelationFlag::empty());

        assert_eq!(graph.detect_cycles(), 1);
        assert!(graph.relation(rel).is_cyclic());
    }

    #[test]
    fn cycle_reached_from_a_root() {
        let (mut graph, ops) = graph_with_ops(4);
        graph.add_operation_relation(ops[0], ops[1], "root", RelationFlag::empty());
        graph.add_operation_relation(ops[1], ops[2], "1 -> 2", RelationFlag::empty());
        graph.add_operation_relation(ops[2], ops[3], "2 -> 3", RelationFlag::empty());
        let closing = graph.add_operation_relation(ops[3], ops[1], "3 -> 1", RelationFlag::empty());

        assert_eq!(graph.detect_cycles(), 1);
        assert!(graph.relation(closing).is_cyclic());
        assert_eq!(graph.relations().filter(|(_, rel)| rel.is_cyclic()).count(), 1);
    }

    #[test]
    fn cycle_path_names_every_step() {
        let (mut graph, ops) = graph_with_ops(3);
        graph.add_operation_relation(ops[0], ops[1], "first", RelationFlag::empty());
        graph.add_operation_relation(ops[1], ops[2], "second", RelationFlag::empty());
        let closing = graph.add_operation_relation(ops[2], ops[0], "third", RelationFlag::empty());

        let stack = vec![
            StackEntry { node: ops[0], via: None, next_child: 1 },
            StackEntry { node: ops[1], via: graph.operation(ops[0]).outlinks().first().copied(), next_child: 1 },
            StackEntry { node: ops[2], via: graph.operation(ops[1]).outlinks().first().copied(), next_child: 1 },
        ];
        let path = graph.describe_cycle(&stack, ops[0], closing);
        let lines: Vec<&str> = path.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "OBCube/PARAMETERS/ID_PROPERTY(p0) depends on",
                "OBCube/PARAMETERS/ID_PROPERTY(p2) via 'third'",
                "OBCube/PARAMETERS/ID_PROPERTY(p1) via 'second'",
                "OBCube/PARAMETERS/ID_PROPERTY(p0) via 'first'",
            ]
        );
    }

    #[test]
    fn detection_is_stable_across_runs() {
        let (mut graph, ops) = graph_with_ops(2);
        graph.add_operation_relation(ops[0], ops[1], "A -> B", RelationFlag::empty());
        graph.add_operation_relation(ops[1], ops[0], "B -> A", RelationFlag::empty());

        assert_eq!(graph.detect_cycles(), 1);
        assert_eq!(graph.detect_cycles(), 1);
        assert_eq!(graph.relations().filter(|(_, rel)| rel.is_cyclic()).count(), 1);
    }
}
